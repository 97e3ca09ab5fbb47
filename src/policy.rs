//! # Signed Upload Policies
//!
//! A policy is a base64-encoded JSON document restricting what a client may
//! upload: the exact object key, the exact byte length and an expiry time. The
//! signature is the base64-encoded HMAC-SHA256 of the encoded policy, keyed by
//! the service secret. The upload route checks both with [`PolicySigner::verify`]
//! before writing the object.
//!
//! ```text
//! {
//!   "expiration": "2026-10-19T11:00:00Z",
//!   "conditions": [
//!     {"bucket": "cloud-storage"},
//!     ["eq", "$key", "cloud-storage/2026-10/19/<id>/<id>.png"],
//!     ["content-length-range", 1000, 1000]
//!   ]
//! }
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use crate::errors::{AppError, AppResult};
use crate::models::UploadPolicy;

type HmacSha256 = Hmac<Sha256>;

/// What a verified policy allows: exactly `file_size` bytes at `object_path`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyGrant {
    pub object_path: String,
    pub file_size: u64,
}

#[derive(Clone)]
pub struct PolicySigner {
    bucket: String,
    secret: String,
    expires_in: Duration,
}

impl PolicySigner {
    pub fn new(bucket: impl Into<String>, secret: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            bucket: bucket.into(),
            secret: secret.into(),
            expires_in,
        }
    }

    /// Issues a policy allowing exactly `file_size` bytes to be written at `object_path`.
    pub fn sign(&self, object_path: &str, file_size: u64, now: DateTime<Utc>) -> AppResult<UploadPolicy> {
        let expiration = (now + self.expires_in).to_rfc3339_opts(SecondsFormat::Secs, true);
        let document = json!({
            "expiration": expiration,
            "conditions": [
                { "bucket": self.bucket },
                ["eq", "$key", object_path],
                ["content-length-range", file_size, file_size],
            ],
        });

        let policy = BASE64.encode(serde_json::to_vec(&document)?);
        let signature = self.signature_of(&policy)?;

        Ok(UploadPolicy { policy, signature })
    }

    /// Checks the signature, bucket and expiry of a policy issued by [`sign`](Self::sign).
    pub fn verify(&self, credential: &UploadPolicy, now: DateTime<Utc>) -> AppResult<PolicyGrant> {
        let signature = BASE64
            .decode(&credential.signature)
            .map_err(|_| rejected("malformed signature"))?;
        let mut mac = self.mac()?;
        mac.update(credential.policy.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| rejected("signature mismatch"))?;

        let document: Value = BASE64
            .decode(&credential.policy)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| rejected("malformed policy"))?;

        let expiration = document["expiration"]
            .as_str()
            .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
            .map(|at| at.with_timezone(&Utc))
            .ok_or_else(|| rejected("missing expiration"))?;
        if now >= expiration {
            return Err(rejected("policy expired"));
        }

        let mut bucket = None;
        let mut object_path = None;
        let mut file_size = None;
        for condition in document["conditions"].as_array().into_iter().flatten() {
            if let Some(name) = condition["bucket"].as_str() {
                bucket = Some(name);
            }
            match condition.as_array().map(Vec::as_slice) {
                Some([op, field, key]) if op == "eq" && field == "$key" => {
                    object_path = key.as_str();
                }
                Some([op, min, max]) if op == "content-length-range" && min == max => {
                    file_size = min.as_u64();
                }
                _ => {}
            }
        }

        if bucket != Some(self.bucket.as_str()) {
            return Err(rejected("bucket mismatch"));
        }
        match (object_path, file_size) {
            (Some(object_path), Some(file_size)) => Ok(PolicyGrant {
                object_path: object_path.to_string(),
                file_size,
            }),
            _ => Err(rejected("missing key or length condition")),
        }
    }

    fn signature_of(&self, policy: &str) -> AppResult<String> {
        let mut mac = self.mac()?;
        mac.update(policy.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|e| AppError::Internal {
            message: format!("Invalid policy secret: {}", e),
        })
    }
}

fn rejected(reason: &str) -> AppError {
    AppError::PolicyRejected {
        reason: reason.to_string(),
    }
}

impl std::fmt::Debug for PolicySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicySigner")
            .field("bucket", &self.bucket)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> PolicySigner {
        PolicySigner::new("cloud-storage", "s3cr3t", Duration::seconds(3600))
    }

    #[test]
    fn policy_document_restricts_key_and_length() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        let signed = signer().sign("p/a.png", 1000, now).unwrap();

        let decoded: serde_json::Value =
            serde_json::from_slice(&BASE64.decode(&signed.policy).unwrap()).unwrap();
        assert_eq!(decoded["expiration"], "2026-10-19T11:00:00Z");
        assert_eq!(decoded["conditions"][0]["bucket"], "cloud-storage");
        assert_eq!(decoded["conditions"][1], json!(["eq", "$key", "p/a.png"]));
        assert_eq!(
            decoded["conditions"][2],
            json!(["content-length-range", 1000, 1000])
        );
    }

    #[test]
    fn signature_is_hmac_of_encoded_policy() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        let signed = signer().sign("p/a.png", 1000, now).unwrap();

        let mut mac = HmacSha256::new_from_slice(b"s3cr3t").unwrap();
        mac.update(signed.policy.as_bytes());
        assert!(mac
            .verify_slice(&BASE64.decode(&signed.signature).unwrap())
            .is_ok());
    }

    #[test]
    fn verify_accepts_what_sign_issued() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        let signed = signer().sign("p/a.png", 1000, now).unwrap();

        let grant = signer().verify(&signed, now + Duration::minutes(59)).unwrap();
        assert_eq!(
            grant,
            PolicyGrant {
                object_path: "p/a.png".to_string(),
                file_size: 1000
            }
        );
    }

    #[test]
    fn verify_rejects_expired_or_forged_policies() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        let signed = signer().sign("p/a.png", 1000, now).unwrap();

        let expired = signer().verify(&signed, now + Duration::hours(1));
        assert!(matches!(expired, Err(AppError::PolicyRejected { .. })));

        let forged = UploadPolicy {
            policy: signer().sign("p/other.png", 1000, now).unwrap().policy,
            signature: signed.signature.clone(),
        };
        assert!(matches!(
            signer().verify(&forged, now),
            Err(AppError::PolicyRejected { .. })
        ));

        let foreign = PolicySigner::new("cloud-storage", "other", Duration::seconds(3600));
        assert!(matches!(
            foreign.verify(&signed, now),
            Err(AppError::PolicyRejected { .. })
        ));
    }

    #[test]
    fn verify_rejects_policies_for_another_bucket() {
        let now = Utc::now();
        let signed = PolicySigner::new("elsewhere", "s3cr3t", Duration::seconds(3600))
            .sign("p/a.png", 1, now)
            .unwrap();
        assert!(matches!(
            signer().verify(&signed, now),
            Err(AppError::PolicyRejected { .. })
        ));
    }

    #[test]
    fn different_secrets_sign_differently() {
        let now = Utc::now();
        let a = signer().sign("p/a.png", 1, now).unwrap();
        let b = PolicySigner::new("cloud-storage", "other", Duration::seconds(3600))
            .sign("p/a.png", 1, now)
            .unwrap();
        assert_eq!(a.policy, b.policy);
        assert_ne!(a.signature, b.signature);
    }
}
