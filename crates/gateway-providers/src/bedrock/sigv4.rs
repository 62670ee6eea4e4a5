//! AWS Signature Version 4 request signing.

use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use url::Url;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Signing service name for the Bedrock runtime
pub const BEDROCK_SERVICE: &str = "bedrock";

type HmacSha256 = Hmac<Sha256>;

/// Signs requests with static credentials
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    access_key_id: String,
    secret_access_key: SecretString,
    session_token: Option<SecretString>,
    region: String,
    service: &'static str,
}

impl SigV4Signer {
    /// Signer for a region and service
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: SecretString,
        session_token: Option<SecretString>,
        region: impl Into<String>,
        service: &'static str,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key,
            session_token,
            region: region.into(),
            service,
        }
    }

    /// Add `host`, `x-amz-date`, `x-amz-content-sha256`, the session token
    /// and `authorization` to `headers`. Header names must be lowercase.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
        headers: &mut BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidLength> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(sha256(body));

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        headers.insert("host".to_string(), host);
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        if let Some(token) = &self.session_token {
            headers.insert(
                "x-amz-security-token".to_string(),
                token.expose_secret().clone(),
            );
        }

        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
        let mut canonical_headers = String::new();
        for (name, value) in headers.iter() {
            let _ = writeln!(canonical_headers, "{name}:{}", value.trim());
        }

        let canonical_request = format!(
            "{method}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
            canonical_uri(url),
            url.query().unwrap_or_default(),
        );

        let credential_scope = format!(
            "{date_stamp}/{}/{}/aws4_request",
            self.region, self.service
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(sha256(canonical_request.as_bytes()))
        );

        let key = signing_key(
            self.secret_access_key.expose_secret(),
            &date_stamp,
            &self.region,
            self.service,
        )?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        headers.insert(
            "authorization".to_string(),
            format!(
                "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.access_key_id
            ),
        );
        Ok(())
    }
}

/// Path with every segment URI-encoded once more. The request path is
/// already encoded, so `:` in a model id appears as `%253A` here.
fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-encode everything outside the unreserved set
pub(crate) fn uri_encode(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

fn signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<[u8; 32], InvalidLength> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const EXAMPLE_SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    #[test]
    fn test_hmac_rfc4231_case_2() {
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_signing_key_derivation() {
        let key = signing_key(EXAMPLE_SECRET, "20120215", "us-east-1", "iam").unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_canonical_uri_double_encodes_model_ids() {
        let url = Url::parse(
            "https://bedrock-runtime.us-east-1.amazonaws.com/model/us.anthropic.claude-3-5-sonnet-20241022-v2%3A0/converse",
        )
        .unwrap();
        assert_eq!(
            canonical_uri(&url),
            "/model/us.anthropic.claude-3-5-sonnet-20241022-v2%253A0/converse"
        );
    }

    #[test]
    fn test_sign_adds_headers() {
        let signer = SigV4Signer::new(
            "AKIDEXAMPLE",
            SecretString::new(EXAMPLE_SECRET.to_string()),
            Some(SecretString::new("token".to_string())),
            "us-east-1",
            BEDROCK_SERVICE,
        );
        let url = Url::parse("http://127.0.0.1:8080/model/m/converse").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let mut headers = BTreeMap::from([(
            "content-type".to_string(),
            "application/json".to_string(),
        )]);

        signer.sign("POST", &url, b"{}", &mut headers, now).unwrap();

        assert_eq!(headers["host"], "127.0.0.1:8080");
        assert_eq!(headers["x-amz-date"], "20240501T123000Z");
        assert_eq!(headers["x-amz-security-token"], "token");
        let auth = &headers["authorization"];
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240501/us-east-1/bedrock/aws4_request, "
        ));
        assert!(auth.contains(
            "SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date;x-amz-security-token, "
        ));

        let mut again = BTreeMap::from([(
            "content-type".to_string(),
            "application/json".to_string(),
        )]);
        signer.sign("POST", &url, b"{}", &mut again, now).unwrap();
        assert_eq!(again["authorization"], headers["authorization"]);
    }
}
