use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use terminal_size::{Width, Height, terminal_size};

pub fn print_header(title: &str, detail: &str) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let width = width.0 as usize;

    let line = "─".repeat(width);
    println!("{}", line.black().bold());

    let name = "MirrorMind".magenta().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}", name, version);

    let info = format!("  {}  •  {}", title, detail).cyan();
    println!("{}", info);

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}

pub fn print_reply(speaker: &str, msg: &str) {
    println!("\n{}: {}\n", speaker.green().bold(), msg);
}

/// Spinner shown while waiting on the backend. Finish it with
/// `finish_and_clear` once the reply arrives.
pub fn spinner(msg: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("  {spinner:.magenta} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(msg.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
