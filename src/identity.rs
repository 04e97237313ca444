//! Agent identity: a name plus an address derived from a seed.
//!
//! The address is `bech32("agent", 0x02 || sha256(seed))`, which gives the
//! familiar `agent1q…` form. It depends on nothing but the seed, so a peer can
//! hard-code it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::AgentConfig;
use crate::error::Error;
use crate::Result;

/// Human-readable part of agent addresses
pub const ADDRESS_HRP: &str = "agent";

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];

/// Name, address, seed and port of one agent instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
    pub address: String,
    #[serde(skip_serializing)]
    pub seed: String,
    pub port: u16,
}

impl AgentIdentity {
    pub fn from_seed(name: impl Into<String>, seed: impl Into<String>, port: u16) -> Self {
        let seed = seed.into();
        Self {
            name: name.into(),
            address: derive_address(&seed),
            seed,
            port,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::from_seed(&config.name, &config.seed, config.port)
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Derive the agent address for a seed.
pub fn derive_address(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());

    let mut key = Vec::with_capacity(33);
    key.push(0x02);
    key.extend_from_slice(&digest);

    bech32_encode(ADDRESS_HRP, &to_base32(&key))
}

/// Check that a string is a well-formed agent address.
pub fn validate_address(address: &str) -> Result<()> {
    let (hrp, _) = bech32_decode(address)?;
    if hrp != ADDRESS_HRP {
        return Err(Error::Config(format!(
            "address {} has prefix {}, expected {}",
            address, hrp, ADDRESS_HRP
        )));
    }
    Ok(())
}

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &v in values {
        let top = chk >> 25;
        chk = ((chk & 0x1ff_ffff) << 5) ^ u32::from(v);
        for (i, g) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 2 + 1);
    out.extend(bytes.iter().map(|b| b >> 5));
    out.push(0);
    out.extend(bytes.iter().map(|b| b & 31));
    out
}

fn to_base32(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((data.len() * 8).div_ceil(5));
    let mut acc: u32 = 0;
    let mut bits = 0;
    for &byte in data {
        acc = (acc << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(((acc >> bits) & 31) as u8);
        }
    }
    if bits > 0 {
        out.push(((acc << (5 - bits)) & 31) as u8);
    }
    out
}

fn bech32_encode(hrp: &str, data: &[u8]) -> String {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0; 6]);
    let checksum = polymod(&values) ^ 1;

    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + 6);
    out.push_str(hrp);
    out.push('1');
    for &d in data {
        out.push(CHARSET[d as usize] as char);
    }
    for i in 0..6 {
        let d = (checksum >> (5 * (5 - i))) & 31;
        out.push(CHARSET[d as usize] as char);
    }
    out
}

fn bech32_decode(s: &str) -> Result<(String, Vec<u8>)> {
    let invalid = |why: &str| Error::Config(format!("invalid address {}: {}", s, why));

    if s.chars().any(|c| c.is_ascii_uppercase()) && s.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(invalid("mixed case"));
    }
    let lower = s.to_ascii_lowercase();
    let sep = lower.rfind('1').ok_or_else(|| invalid("missing separator"))?;
    if sep == 0 || sep + 7 > lower.len() {
        return Err(invalid("bad length"));
    }

    let (hrp, rest) = lower.split_at(sep);
    let data: Vec<u8> = rest[1..]
        .bytes()
        .map(|c| CHARSET.iter().position(|&x| x == c).map(|p| p as u8))
        .collect::<Option<_>>()
        .ok_or_else(|| invalid("character outside the bech32 alphabet"))?;

    let mut values = hrp_expand(hrp);
    values.extend_from_slice(&data);
    if polymod(&values) != 1 {
        return Err(invalid("checksum mismatch"));
    }

    Ok((hrp.to_string(), data[..data.len() - 6].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_deterministic() {
        let a = derive_address("mirrormind.server.demo");
        let b = derive_address("mirrormind.server.demo");
        assert_eq!(a, b);
        assert_ne!(a, derive_address("mirrormind.client.test"));
    }

    #[test]
    fn test_address_shape() {
        let address = derive_address("mirrormind.client.test");
        assert!(address.starts_with("agent1q"));
        assert_eq!(address.len(), 65);
        validate_address(&address).unwrap();
    }

    #[test]
    fn test_identity_from_config() {
        let config = AgentConfig::default();
        let identity = AgentIdentity::from_config(&config);
        assert_eq!(identity.name, "mirror_mind");
        assert_eq!(identity.port, 8080);
        assert_eq!(identity.address, derive_address(&config.seed));
    }

    #[test]
    fn test_seed_not_serialized() {
        let identity = AgentIdentity::from_seed("proxy", "secret-seed", 8082);
        let json = serde_json::to_string(&identity).unwrap();
        assert!(!json.contains("secret-seed"));
    }

    #[test]
    fn test_bech32_reference_vectors() {
        assert_eq!(bech32_encode("a", &[]), "a12uel5l");

        let data: Vec<u8> = (0..32).collect();
        assert_eq!(
            bech32_encode("abcdef", &data),
            "abcdef1qpzry9x8gf2tvdw0s3jn54khce6mua7lmqqqxw"
        );
    }

    #[test]
    fn test_validate_rejects_corruption() {
        let mut address = derive_address("mirrormind.server.demo");
        let last = address.pop().unwrap();
        address.push(if last == 'q' { 'p' } else { 'q' });
        assert!(validate_address(&address).is_err());

        assert!(validate_address("a12uel5l").is_err());
        assert!(validate_address("not-an-address").is_err());
    }
}
