//! NTLM message codec (NTLMv2 responses)
//!
//! Only what an HTTP client needs: build NEGOTIATE, read the server's
//! CHALLENGE from `WWW-Authenticate`, and answer with AUTHENTICATE.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use thiserror::Error;

type HmacMd5 = Hmac<Md5>;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const CLIENT_FLAGS: u32 = NEGOTIATE_UNICODE
    | NEGOTIATE_OEM
    | REQUEST_TARGET
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSIONSECURITY
    | NEGOTIATE_128
    | NEGOTIATE_56;

const AV_EOL: u16 = 0;
const AV_TIMESTAMP: u16 = 7;

/// Seconds between 1601-01-01 and the Unix epoch
const FILETIME_EPOCH_OFFSET: i64 = 11_644_473_600;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NtlmError {
    #[error("no NTLM challenge in WWW-Authenticate")]
    MissingChallenge,
    #[error("challenge is not valid base64")]
    InvalidEncoding,
    #[error("malformed challenge message: {0}")]
    Malformed(&'static str),
    #[error("HMAC key rejected: {0}")]
    Digest(String),
}

#[derive(Debug, Clone, Default)]
pub struct NtlmCredentials {
    pub username: String,
    pub password: String,
    pub domain: String,
    pub workstation: String,
}

/// Decoded type 2 message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub flags: u32,
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

impl Challenge {
    fn unicode(&self) -> bool {
        self.flags & NEGOTIATE_UNICODE != 0
    }

    /// Server-supplied FILETIME from the AV pairs, if any
    pub fn timestamp(&self) -> Option<u64> {
        let mut rest = self.target_info.as_slice();
        while rest.len() >= 4 {
            let id = u16::from_le_bytes([rest[0], rest[1]]);
            let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
            if id == AV_EOL || rest.len() < 4 + len {
                break;
            }
            let value = &rest[4..4 + len];
            if id == AV_TIMESTAMP && len == 8 {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(value);
                return Some(u64::from_le_bytes(bytes));
            }
            rest = &rest[4 + len..];
        }
        None
    }
}

/// `Authorization` header value carrying an NTLM message
pub fn header_value(message: &[u8]) -> String {
    format!("NTLM {}", STANDARD.encode(message))
}

/// Type 1 message
pub fn negotiate_message() -> Vec<u8> {
    let mut msg = Vec::with_capacity(32);
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&1u32.to_le_bytes());
    msg.extend_from_slice(&CLIENT_FLAGS.to_le_bytes());
    // Empty domain and workstation buffers
    push_security_buffer(&mut msg, 0, 32);
    push_security_buffer(&mut msg, 0, 32);
    msg
}

/// Pull the type 2 message out of one `WWW-Authenticate` value
pub fn challenge_from_header(value: &str) -> Result<Challenge, NtlmError> {
    let encoded = value
        .trim()
        .strip_prefix("NTLM ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(NtlmError::MissingChallenge)?;
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| NtlmError::InvalidEncoding)?;
    parse_challenge(&bytes)
}

pub fn parse_challenge(bytes: &[u8]) -> Result<Challenge, NtlmError> {
    if bytes.len() < 32 {
        return Err(NtlmError::Malformed("message too short"));
    }
    if &bytes[0..8] != SIGNATURE {
        return Err(NtlmError::Malformed("bad signature"));
    }
    if read_u32(bytes, 8) != 2 {
        return Err(NtlmError::Malformed("not a challenge message"));
    }

    let flags = read_u32(bytes, 20);
    let mut server_challenge = [0u8; 8];
    server_challenge.copy_from_slice(&bytes[24..32]);

    let target_info = if bytes.len() >= 48 {
        let len = read_u16(bytes, 40) as usize;
        let offset = read_u32(bytes, 44) as usize;
        bytes
            .get(offset..offset + len)
            .ok_or(NtlmError::Malformed("target info out of bounds"))?
            .to_vec()
    } else {
        Vec::new()
    };

    Ok(Challenge {
        flags,
        server_challenge,
        target_info,
    })
}

/// Type 3 message answering `challenge`
pub fn authenticate_message(
    credentials: &NtlmCredentials,
    challenge: &Challenge,
    client_challenge: [u8; 8],
) -> Result<Vec<u8>, NtlmError> {
    let server_timestamp = challenge.timestamp();
    let timestamp = server_timestamp.unwrap_or_else(filetime_now);

    let v2_hash = ntlmv2_hash(
        &nt_hash(&credentials.password),
        &credentials.username,
        &credentials.domain,
    )?;
    let nt_response = ntlmv2_response(
        &v2_hash,
        &challenge.server_challenge,
        &client_challenge,
        timestamp,
        &challenge.target_info,
    )?;
    // With a server timestamp the LM slot must be zeroed
    let lm_response = if server_timestamp.is_some() {
        vec![0u8; 24]
    } else {
        lmv2_response(&v2_hash, &challenge.server_challenge, &client_challenge)?
    };

    let encode = |s: &str| {
        if challenge.unicode() {
            utf16le(s)
        } else {
            s.as_bytes().to_vec()
        }
    };
    let domain = encode(&credentials.domain);
    let user = encode(&credentials.username);
    let workstation = encode(&credentials.workstation);

    let flags = (challenge.flags & CLIENT_FLAGS)
        | (challenge.flags & NEGOTIATE_TARGET_INFO)
        | NEGOTIATE_NTLM;

    let mut offset = 64u32;
    let mut header = Vec::with_capacity(64);
    header.extend_from_slice(SIGNATURE);
    header.extend_from_slice(&3u32.to_le_bytes());

    let mut payload = Vec::new();
    for field in [
        &lm_response,
        &nt_response,
        &domain,
        &user,
        &workstation,
    ] {
        push_security_buffer(&mut header, field.len() as u16, offset);
        payload.extend_from_slice(field);
        offset += field.len() as u32;
    }
    // No session key
    push_security_buffer(&mut header, 0, offset);
    header.extend_from_slice(&flags.to_le_bytes());

    header.extend_from_slice(&payload);
    Ok(header)
}

pub fn nt_hash(password: &str) -> [u8; 16] {
    let digest = Md4::digest(utf16le(password));
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    out
}

pub fn ntlmv2_hash(
    nt_hash: &[u8; 16],
    username: &str,
    domain: &str,
) -> Result<[u8; 16], NtlmError> {
    let identity = utf16le(&format!("{}{}", username.to_uppercase(), domain));
    hmac_md5(nt_hash, &[identity.as_slice()])
}

pub fn lmv2_response(
    v2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
) -> Result<Vec<u8>, NtlmError> {
    let proof = hmac_md5(v2_hash, &[server_challenge.as_slice(), client_challenge.as_slice()])?;
    let mut out = proof.to_vec();
    out.extend_from_slice(client_challenge);
    Ok(out)
}

pub fn ntlmv2_response(
    v2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
    timestamp: u64,
    target_info: &[u8],
) -> Result<Vec<u8>, NtlmError> {
    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&[0x01, 0x01, 0, 0, 0, 0, 0, 0]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(client_challenge);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0u8; 4]);

    let proof = hmac_md5(v2_hash, &[server_challenge.as_slice(), blob.as_slice()])?;
    let mut out = proof.to_vec();
    out.extend_from_slice(&blob);
    Ok(out)
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 16], NtlmError> {
    let mut mac = HmacMd5::new_from_slice(key).map_err(|e| NtlmError::Digest(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    let digest = mac.finalize().into_bytes();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    Ok(out)
}

fn filetime_now() -> u64 {
    let now = chrono::Utc::now();
    let secs = (now.timestamp() + FILETIME_EPOCH_OFFSET) as u64;
    secs * 10_000_000 + u64::from(now.timestamp_subsec_nanos() / 100)
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn push_security_buffer(buf: &mut Vec<u8>, len: u16, offset: u32) {
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
