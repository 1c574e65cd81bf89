//! Lookup tables translating TLS parameter names from configuration into
//! their registered IANA identifiers.

use thiserror::Error;

/// Errors from the TLS parameter lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TlsParamError {
    #[error("cipher suite {0} not supported or doesn't exist")]
    UnknownCipherSuite(String),

    #[error("unknown tls version {0:?}")]
    UnknownVersion(String),
}

/// Cipher suites accepted in configuration, name → IANA id. The list
/// matches the suites modern TLS stacks enable by default (TLS 1.3 suites
/// plus the uncompromised TLS 1.0–1.2 ones).
const CIPHER_SUITES: [(&str, u16); 17] = [
    ("TLS_RSA_WITH_AES_128_CBC_SHA", 0x002f),
    ("TLS_RSA_WITH_AES_256_CBC_SHA", 0x0035),
    ("TLS_RSA_WITH_AES_128_GCM_SHA256", 0x009c),
    ("TLS_RSA_WITH_AES_256_GCM_SHA384", 0x009d),
    ("TLS_AES_128_GCM_SHA256", 0x1301),
    ("TLS_AES_256_GCM_SHA384", 0x1302),
    ("TLS_CHACHA20_POLY1305_SHA256", 0x1303),
    ("TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA", 0xc009),
    ("TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA", 0xc00a),
    ("TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA", 0xc013),
    ("TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA", 0xc014),
    ("TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", 0xc02b),
    ("TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384", 0xc02c),
    ("TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", 0xc02f),
    ("TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", 0xc030),
    ("TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256", 0xcca8),
    ("TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256", 0xcca9),
];

const VERSIONS: [(&str, u16); 4] = [
    ("1.0", 0x0301),
    ("1.1", 0x0302),
    ("1.2", 0x0303),
    ("1.3", 0x0304),
];

/// Maps cipher suite names to their ids, preserving input order.
///
/// An unknown name fails the whole call with no partial output. An empty
/// input yields an empty list and no error.
pub fn cipher_suite_names_to_ids(names: &[&str]) -> Result<Vec<u16>, TlsParamError> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id = CIPHER_SUITES
            .iter()
            .find(|(suite, _)| suite == name)
            .map(|(_, id)| *id)
            .ok_or_else(|| TlsParamError::UnknownCipherSuite((*name).to_owned()))?;
        ids.push(id);
    }
    Ok(ids)
}

/// Maps a TLS version name (`"1.0"` … `"1.3"`) to its protocol id.
pub fn version_name_to_id(name: &str) -> Result<u16, TlsParamError> {
    VERSIONS
        .iter()
        .find(|(version, _)| *version == name)
        .map(|(_, id)| *id)
        .ok_or_else(|| TlsParamError::UnknownVersion(name.to_owned()))
}
