//! Public key -> CKB address derivation
//!
//! The popup only reveals a public key. The account address is the UniPass
//! lock script with a hash of that key as `args`, encoded as a CKB full-format
//! address (payload `0x00 | code_hash | hash_type | args`, bech32m).

use crate::{ArgsHash, EncodingError, Network};
use bech32::{Bech32m, Hrp};
use blake2::{
    digest::{
        core_api::{Buffer, UpdateCore, VariableOutputCore},
        Output,
    },
    Blake2bVarCore,
};
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

const CKB_HASH_PERSONALIZATION: &[u8] = b"ckb-default-hash";
const FULL_FORMAT: u8 = 0x00;

/// Bytes of the blake2b digest kept as lock args
pub const BLAKE160_LEN: usize = 20;

/// Code hash of the UniPass lock (hash type `type`)
pub const UNIPASS_LOCK_CODE_HASH: [u8; 32] = [
    0x68, 0x43, 0xc5, 0xfe, 0x3a, 0xcb, 0x7f, 0x4d, 0xc2, 0x23, 0x03, 0x92, 0x81, 0x3c, 0xb9, 0xc1,
    0x2d, 0xbc, 0xed, 0x55, 0x97, 0xfc, 0xa3, 0x0a, 0x52, 0xf1, 0x3a, 0xa5, 0x19, 0xde, 0x8d, 0x33,
];

/// blake2b-256 with CKB's personalization
pub fn ckb_hash(data: &[u8]) -> [u8; 32] {
    let mut core = Blake2bVarCore::new_with_params(&[], CKB_HASH_PERSONALIZATION, 0, 32);
    let mut buffer = Buffer::<Blake2bVarCore>::default();
    buffer.digest_blocks(data, |blocks| core.update_blocks(blocks));

    let mut full = Output::<Blake2bVarCore>::default();
    core.finalize_variable_core(&mut buffer, &mut full);

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&full[..32]);
    hash
}

pub fn blake160(data: &[u8]) -> [u8; BLAKE160_LEN] {
    let mut out = [0u8; BLAKE160_LEN];
    out.copy_from_slice(&ckb_hash(data)[..BLAKE160_LEN]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashType {
    Data,
    Type,
    Data1,
    Data2,
}

impl HashType {
    pub fn as_byte(&self) -> u8 {
        match self {
            HashType::Data => 0x00,
            HashType::Type => 0x01,
            HashType::Data1 => 0x02,
            HashType::Data2 => 0x04,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(HashType::Data),
            0x01 => Some(HashType::Type),
            0x02 => Some(HashType::Data1),
            0x04 => Some(HashType::Data2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Script {
    pub code_hash: [u8; 32],
    pub hash_type: HashType,
    pub args: Vec<u8>,
}

impl Script {
    pub fn unipass_lock(args: Vec<u8>) -> Self {
        Self {
            code_hash: UNIPASS_LOCK_CODE_HASH,
            hash_type: HashType::Type,
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CkbAddress {
    prefix: Hrp,
    script: Script,
}

impl CkbAddress {
    pub fn new(prefix: &str, script: Script) -> Result<Self, EncodingError> {
        let prefix =
            Hrp::parse(prefix).map_err(|e| EncodingError::InvalidPrefix(e.to_string()))?;
        Ok(Self { prefix, script })
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn prefix(&self) -> String {
        self.prefix.to_string()
    }

    pub fn encode(&self) -> Result<String, EncodingError> {
        let mut payload = Vec::with_capacity(34 + self.script.args.len());
        payload.push(FULL_FORMAT);
        payload.extend_from_slice(&self.script.code_hash);
        payload.push(self.script.hash_type.as_byte());
        payload.extend_from_slice(&self.script.args);

        bech32::encode::<Bech32m>(self.prefix, &payload)
            .map_err(|e| EncodingError::Bech32Encode(e.to_string()))
    }
}

impl fmt::Display for CkbAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode().map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl FromStr for CkbAddress {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, payload) =
            bech32::decode(s).map_err(|e| EncodingError::Bech32Decode(e.to_string()))?;

        let Some((&format, rest)) = payload.split_first() else {
            return Err(EncodingError::InvalidPayload("empty payload".into()));
        };
        if format != FULL_FORMAT {
            return Err(EncodingError::InvalidPayload(format!(
                "unsupported address format 0x{:02x}",
                format
            )));
        }
        if rest.len() < 33 {
            return Err(EncodingError::InvalidPayload(format!(
                "payload too short: {} bytes",
                payload.len()
            )));
        }

        let mut code_hash = [0u8; 32];
        code_hash.copy_from_slice(&rest[..32]);
        let hash_type = HashType::from_byte(rest[32]).ok_or_else(|| {
            EncodingError::InvalidPayload(format!("unknown hash type 0x{:02x}", rest[32]))
        })?;

        Ok(Self {
            prefix,
            script: Script {
                code_hash,
                hash_type,
                args: rest[33..].to_vec(),
            },
        })
    }
}

impl Serialize for CkbAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = self.encode().map_err(ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for CkbAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(de::Error::custom)
    }
}

/// Turns the public key reported by the popup into an account address
pub trait IdentityEncoder {
    fn encode(&self, pubkey: &str) -> Result<CkbAddress, EncodingError>;
}

impl<F> IdentityEncoder for F
where
    F: Fn(&str) -> Result<CkbAddress, EncodingError>,
{
    fn encode(&self, pubkey: &str) -> Result<CkbAddress, EncodingError> {
        self(pubkey)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnipassIdentityEncoder {
    network: Network,
    args_hash: ArgsHash,
}

impl UnipassIdentityEncoder {
    pub fn new(network: Network, args_hash: ArgsHash) -> Self {
        Self { network, args_hash }
    }

    /// `Sha256` hashes the key string as given, so it takes keys in any text form
    pub fn lock_args(&self, pubkey: &str) -> Result<Vec<u8>, EncodingError> {
        match self.args_hash {
            ArgsHash::Blake160 => Ok(blake160(&decode_pubkey(pubkey)?).to_vec()),
            ArgsHash::Sha256 => {
                if pubkey.trim().is_empty() {
                    return Err(EncodingError::EmptyPublicKey);
                }
                Ok(Sha256::digest(pubkey.as_bytes()).to_vec())
            }
        }
    }
}

impl IdentityEncoder for UnipassIdentityEncoder {
    fn encode(&self, pubkey: &str) -> Result<CkbAddress, EncodingError> {
        let args = self.lock_args(pubkey)?;
        CkbAddress::new(self.network.address_prefix(), Script::unipass_lock(args))
    }
}

fn decode_pubkey(pubkey: &str) -> Result<Vec<u8>, EncodingError> {
    let trimmed = pubkey.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex_part.is_empty() {
        return Err(EncodingError::EmptyPublicKey);
    }
    hex::decode(hex_part).map_err(|e| EncodingError::InvalidHex(e.to_string()))
}
