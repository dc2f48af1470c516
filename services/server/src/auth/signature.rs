//! Ed25519 签名校验与公钥摘要。

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};
use blake2::{Blake2b, Digest, digest::consts::U32};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

type Blake2b256 = Blake2b<U32>;

/// 宽松 base64 解码：先按 URL 安全无填充，再依次尝试其余三种常见变体。
pub(crate) fn decode_b64(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim();
    [URL_SAFE_NO_PAD, URL_SAFE, STANDARD_NO_PAD, STANDARD]
        .iter()
        .find_map(|engine| engine.decode(trimmed.as_bytes()).ok())
}

/// 解析 32 字节 Ed25519 公钥。
pub(crate) fn parse_public_key(raw: &str) -> Option<VerifyingKey> {
    let bytes: [u8; 32] = decode_b64(raw)?.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}

/// 公钥摘要：BLAKE2b-256 后 URL 安全无填充 base64。
pub(crate) fn public_key_hash(key: &VerifyingKey) -> String {
    URL_SAFE_NO_PAD.encode(Blake2b256::digest(key.as_bytes()))
}

/// 校验分离签名；签名无法解码同样视为失败。
pub(crate) fn verify_detached(key: &VerifyingKey, message: &[u8], signature_b64: &str) -> bool {
    let Some(raw) = decode_b64(signature_b64) else {
        return false;
    };
    let Ok(bytes) = <[u8; 64]>::try_from(raw) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(&bytes)).is_ok()
}
