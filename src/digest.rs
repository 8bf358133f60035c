//! Axis VAPIX transport
//! HTTP Digest challenge parsing and response computation (RFC 2617 / RFC 7616)
//!
//! Every request negotiates from scratch: the nonce counter starts at 1 and is
//! used exactly once, so nothing here keeps state between calls.

use log::debug;
use reqwest::header::{ HeaderMap, HeaderValue, WWW_AUTHENTICATE };
use sha2::{ Digest as _, Sha256 };

use crate::error::{ Result, VapixError };

/// Digest hash algorithm announced by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl Algorithm {
    /// Absent algorithm means MD5
    pub fn from_token(token: Option<&str>) -> Result<Self> {
        let Some(token) = token else {
            return Ok(Algorithm::Md5);
        };
        match token.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Algorithm::Md5),
            "MD5-SESS" => Ok(Algorithm::Md5Sess),
            "SHA-256" => Ok(Algorithm::Sha256),
            "SHA-256-SESS" => Ok(Algorithm::Sha256Sess),
            _ => Err(VapixError::invalid_input(format!("Unsupported digest algorithm: {}", token))),
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Md5Sess => "MD5-sess",
            Algorithm::Sha256 => "SHA-256",
            Algorithm::Sha256Sess => "SHA-256-sess",
        }
    }

    fn is_session(&self) -> bool {
        matches!(self, Algorithm::Md5Sess | Algorithm::Sha256Sess)
    }

    fn hash(&self, input: &str) -> String {
        match self {
            Algorithm::Md5 | Algorithm::Md5Sess => format!("{:x}", md5::compute(input.as_bytes())),
            Algorithm::Sha256 | Algorithm::Sha256Sess => hex::encode(Sha256::digest(input.as_bytes())),
        }
    }
}

/// Parameters of a `WWW-Authenticate: Digest ...` challenge.
///
/// Only meaningful together with the method and URI of the request that
/// produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    /// Raw qop list, e.g. `auth,auth-int`
    pub qop: Option<String>,
    /// Raw algorithm token, `None` when the server omitted it
    pub algorithm: Option<String>,
}

impl AuthChallenge {
    /// Extract the Digest challenge from a `WWW-Authenticate` header value.
    ///
    /// Servers may offer several schemes in one header; only Digest is used.
    pub fn parse(header: &str) -> Result<Self> {
        let challenges = http_auth::parse_challenges(header).map_err(|e| {
            VapixError::invalid_input(format!("Malformed WWW-Authenticate header: {}", e))
        })?;

        let digest = challenges
            .into_iter()
            .find(|c| c.scheme.eq_ignore_ascii_case("Digest"))
            .ok_or_else(|| {
                VapixError::invalid_input(format!("No Digest challenge offered: {}", header))
            })?;

        let mut challenge = AuthChallenge::default();
        for (name, value) in &digest.params {
            let value = value.to_unescaped();
            match name.to_ascii_lowercase().as_str() {
                "realm" => {
                    challenge.realm = value;
                }
                "nonce" => {
                    challenge.nonce = value;
                }
                "opaque" => {
                    challenge.opaque = Some(value);
                }
                "qop" => {
                    challenge.qop = Some(value);
                }
                "algorithm" => {
                    challenge.algorithm = Some(value);
                }
                _ => {}
            }
        }
        Ok(challenge)
    }

    pub fn from_header_value(value: &HeaderValue) -> Result<Self> {
        let header = value
            .to_str()
            .map_err(|_| VapixError::invalid_input("WWW-Authenticate header is not ASCII"))?;
        Self::parse(header)
    }

    /// Find the Digest challenge among all `WWW-Authenticate` headers.
    ///
    /// Devices that accept both Basic and Digest may send each scheme on its
    /// own header line, in either order.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let mut last_err = None;
        for value in headers.get_all(WWW_AUTHENTICATE) {
            match Self::from_header_value(value) {
                Ok(challenge) => {
                    return Ok(challenge);
                }
                Err(err) => {
                    debug!("Skipping WWW-Authenticate header: {}", err.message);
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| VapixError::invalid_input("No WWW-Authenticate header")))
    }

    /// Pick `auth` from the offered qop list; `None` means RFC 2069 mode
    fn select_qop(&self) -> Result<Option<&'static str>> {
        let Some(offered) = self.qop.as_deref() else {
            return Ok(None);
        };
        let mut tokens = offered.split(',').map(str::trim).filter(|t| !t.is_empty()).peekable();
        if tokens.peek().is_none() {
            return Ok(None);
        }
        if tokens.any(|t| t.eq_ignore_ascii_case("auth")) {
            Ok(Some("auth"))
        } else {
            Err(VapixError::invalid_input(format!("Unsupported digest qop: {}", offered)))
        }
    }
}

/// Nonce count attached to one negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceCounter(u32);

impl NonceCounter {
    pub fn first() -> Self {
        NonceCounter(1)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Wire form, eight lowercase hex digits
    pub fn as_hex(&self) -> String {
        format!("{:08x}", self.0)
    }
}

impl Default for NonceCounter {
    fn default() -> Self {
        Self::first()
    }
}

/// Compute the `Authorization` header value for one request.
///
/// Deterministic: the client nonce is derived from the challenge, the user
/// and the URI, so the same inputs always give the same header.
pub fn negotiate(
    challenge: &AuthChallenge,
    user: &str,
    password: &str,
    method: &str,
    uri: &str
) -> Result<String> {
    let algorithm = Algorithm::from_token(challenge.algorithm.as_deref())?;
    let nc = NonceCounter::first();
    let cnonce = derive_cnonce(algorithm, challenge, user, digest_uri(uri), nc);
    negotiate_with_cnonce(challenge, user, password, method, uri, nc, &cnonce)
}

/// Same as [`negotiate`] with an explicit nonce count and client nonce
pub fn negotiate_with_cnonce(
    challenge: &AuthChallenge,
    user: &str,
    password: &str,
    method: &str,
    uri: &str,
    nc: NonceCounter,
    cnonce: &str
) -> Result<String> {
    if challenge.nonce.is_empty() {
        return Err(VapixError::invalid_input("Digest challenge has no nonce"));
    }
    if challenge.realm.is_empty() {
        return Err(VapixError::invalid_input("Digest challenge has no realm"));
    }
    let algorithm = Algorithm::from_token(challenge.algorithm.as_deref())?;
    let qop = challenge.select_qop()?;
    let uri = digest_uri(uri);
    let nc_hex = nc.as_hex();

    let mut ha1 = algorithm.hash(&format!("{}:{}:{}", user, challenge.realm, password));
    if algorithm.is_session() {
        ha1 = algorithm.hash(&format!("{}:{}:{}", ha1, challenge.nonce, cnonce));
    }
    let ha2 = algorithm.hash(&format!("{}:{}", method, uri));

    let response = match qop {
        Some(qop) =>
            algorithm.hash(
                &format!("{}:{}:{}:{}:{}:{}", ha1, challenge.nonce, nc_hex, cnonce, qop, ha2)
            ),
        None => algorithm.hash(&format!("{}:{}:{}", ha1, challenge.nonce, ha2)),
    };

    let mut auth_value = format!(
        r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}""#,
        quote(user),
        quote(&challenge.realm),
        quote(&challenge.nonce),
        quote(uri),
        response
    );

    if challenge.algorithm.is_some() {
        auth_value.push_str(&format!(", algorithm={}", algorithm.token()));
    }
    if let Some(qop) = qop {
        auth_value.push_str(&format!(r#", qop={}, nc={}, cnonce="{}""#, qop, nc_hex, quote(cnonce)));
    }
    if let Some(opaque) = &challenge.opaque {
        auth_value.push_str(&format!(r#", opaque="{}""#, quote(opaque)));
    }

    debug!("Computed digest response for {} {} (realm {})", method, uri, challenge.realm);
    Ok(auth_value)
}

/// The digest URI is the request path; the query string is excluded
fn digest_uri(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}

fn derive_cnonce(
    algorithm: Algorithm,
    challenge: &AuthChallenge,
    user: &str,
    uri: &str,
    nc: NonceCounter
) -> String {
    let seed = algorithm.hash(
        &format!("{}:{}:{}:{}:{}", challenge.nonce, challenge.realm, nc.as_hex(), user, uri)
    );
    seed[..16].to_string()
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
