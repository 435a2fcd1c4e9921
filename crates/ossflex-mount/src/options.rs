//! Volume options as sent by the kubelet, and their validation.
//!
//! The kubelet passes options as a flat JSON object of strings. Keys this
//! driver understands are decoded into [`VolumeOptions`]; keys it injects on
//! its own behalf (`kubernetes.io/pod.name`, `kubernetes.io/fsType`, ...) are
//! accepted and ignored; anything else is rejected before any side effect.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

/// Prefix every ossfs pass-through flag string must start with.
pub const OTHER_OPTS_PREFIX: &str = "-o ";

/// Key namespace the kubelet reserves for options it injects.
const KUBERNETES_NAMESPACE: &str = "kubernetes.io/";

/// Errors found while decoding or validating volume options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The options argument is not a JSON object of strings
    #[error("malformed volume options: {0}")]
    Malformed(String),

    /// A key outside the recognized set and outside `kubernetes.io/`
    #[error("unknown volume option: {0}")]
    UnknownOption(String),

    /// `url` or `bucket` was empty
    #[error("url or bucket is empty")]
    MissingEndpoint,

    /// A `kubernetes.io/secret/*` value was not valid base64 text
    #[error("{field} is not valid base64")]
    SecretDecode {
        /// Option key
        field: &'static str,
    },

    /// `otherOpts` does not start with `-o `
    #[error("otherOpts must start with \"-o \": {0}")]
    OtherOptsFormat(String),

    /// `uid` or `gid` is not a non-negative integer
    #[error("{field} is not an integer: {value}")]
    InvalidId {
        /// Option key
        field: &'static str,
        /// The rejected value
        value: String,
    },

    /// A value bound for the credential file contains one of its separators
    #[error("{field} must not contain ':' or line breaks")]
    CredentialSeparator {
        /// Option key, or the ambient key file name
        field: &'static str,
    },

    /// `subpath` would leave the bucket mount
    #[error("subpath must stay inside the bucket: {0}")]
    SubpathEscapes(String),
}

/// Raw volume options exactly as the kubelet sends them.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct VolumeOptions {
    /// Bucket name
    pub bucket: String,
    /// Directory inside the bucket to expose instead of its root
    pub subpath: String,
    /// Owner applied to the subpath directory
    pub uid: String,
    /// Group applied to the subpath directory
    pub gid: String,
    /// OSS endpoint
    pub url: String,
    /// Extra ossfs flags, e.g. `-o max_stat_cache_size=0`
    #[serde(rename = "otherOpts")]
    pub other_opts: String,
    /// Plaintext AccessKey id
    #[serde(rename = "akId")]
    pub ak_id: String,
    /// Plaintext AccessKey secret
    #[serde(rename = "akSecret")]
    pub ak_secret: String,
    /// Logical volume name
    #[serde(rename = "kubernetes.io/pvOrVolumeName")]
    pub volume_name: String,
    /// Base64 AccessKey id from a referenced secret
    #[serde(rename = "kubernetes.io/secret/akId")]
    pub secret_ak_id: String,
    /// Base64 AccessKey secret from a referenced secret
    #[serde(rename = "kubernetes.io/secret/akSecret")]
    pub secret_ak_secret: String,

    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

impl fmt::Debug for VolumeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeOptions")
            .field("bucket", &self.bucket)
            .field("subpath", &self.subpath)
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .field("url", &self.url)
            .field("other_opts", &self.other_opts)
            .field("ak_id", &self.ak_id)
            .field("volume_name", &self.volume_name)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl VolumeOptions {
    /// Decode the kubelet's JSON options argument.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))?;

        if let Some(key) = options
            .extra
            .keys()
            .find(|key| !key.starts_with(KUBERNETES_NAMESPACE))
        {
            return Err(ValidationError::UnknownOption(key.clone()));
        }

        Ok(options)
    }

    /// Validate the options and resolve credentials.
    ///
    /// Secret-sourced keys win over plaintext ones. When either half of the
    /// key is still empty afterwards, `ambient` supplies both halves.
    pub fn into_request(
        self,
        ambient: &dyn AmbientCredentials,
    ) -> Result<VolumeRequest, ValidationError> {
        if self.url.is_empty() || self.bucket.is_empty() {
            return Err(ValidationError::MissingEndpoint);
        }

        let mut ak_id = self.ak_id;
        let mut ak_secret = self.ak_secret;
        if !self.secret_ak_id.is_empty() && !self.secret_ak_secret.is_empty() {
            ak_id = decode_secret("kubernetes.io/secret/akId", &self.secret_ak_id)?;
            ak_secret = decode_secret("kubernetes.io/secret/akSecret", &self.secret_ak_secret)?;
        }
        let credentials = if ak_id.is_empty() || ak_secret.is_empty() {
            ambient.access_key()
        } else {
            AccessKey::new(ak_id, ak_secret)
        };
        check_credential_field("bucket", &self.bucket)?;
        check_credential_field("akId", &credentials.id)?;
        check_credential_field("akSecret", credentials.secret())?;

        let extra_flags = if self.other_opts.is_empty() {
            Vec::new()
        } else if self.other_opts.starts_with(OTHER_OPTS_PREFIX) {
            self.other_opts
                .split_whitespace()
                .map(str::to_string)
                .collect()
        } else {
            return Err(ValidationError::OtherOptsFormat(self.other_opts));
        };

        let uid = parse_id("uid", &self.uid)?;
        let gid = parse_id("gid", &self.gid)?;
        let subpath = normalize_subpath(&self.subpath)?;

        Ok(VolumeRequest {
            bucket: self.bucket,
            subpath,
            url: self.url,
            uid,
            gid,
            extra_flags,
            volume_name: self.volume_name,
            credentials,
        })
    }
}

fn decode_secret(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|_| ValidationError::SecretDecode { field })?;
    let decoded = String::from_utf8(bytes).map_err(|_| ValidationError::SecretDecode { field })?;
    // `echo $KEY | base64` encodes a trailing newline
    Ok(decoded.trim().to_string())
}

/// Reject values that would split a `bucket:akId:akSecret` line.
fn check_credential_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.contains([':', '\n', '\r']) {
        return Err(ValidationError::CredentialSeparator { field });
    }
    Ok(())
}

fn parse_id(field: &'static str, value: &str) -> Result<u32, ValidationError> {
    if value.is_empty() {
        return Ok(0);
    }
    value.parse().map_err(|_| ValidationError::InvalidId {
        field,
        value: value.to_string(),
    })
}

fn normalize_subpath(raw: &str) -> Result<Option<PathBuf>, ValidationError> {
    let mut subpath = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => subpath.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(ValidationError::SubpathEscapes(raw.to_string()));
            }
        }
    }
    Ok((!subpath.as_os_str().is_empty()).then_some(subpath))
}

/// A validated mount request.
#[derive(Debug)]
pub struct VolumeRequest {
    /// Bucket name, never empty
    pub bucket: String,
    /// Relative directory inside the bucket, if one was requested
    pub subpath: Option<PathBuf>,
    /// OSS endpoint, never empty
    pub url: String,
    /// Owner for the subpath directory
    pub uid: u32,
    /// Group for the subpath directory
    pub gid: u32,
    /// ossfs flags passed through verbatim
    pub extra_flags: Vec<String>,
    /// Logical volume name
    pub volume_name: String,
    /// Resolved AccessKey pair
    pub credentials: AccessKey,
}

/// An AccessKey id and secret pair.
#[derive(Debug)]
pub struct AccessKey {
    /// AccessKey id
    pub id: String,
    secret: SecretString,
}

impl AccessKey {
    /// Build a key pair.
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// The secret half.
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Whether either half is missing.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() || self.secret().is_empty()
    }
}

/// Source of credentials when the volume options carry none.
pub trait AmbientCredentials {
    /// Return the node's default key pair. May be empty.
    fn access_key(&self) -> AccessKey;
}

/// Reads `akId` and `akSecret` files from a node-local directory.
#[derive(Debug, Clone)]
pub struct KeyFileCredentials {
    dir: PathBuf,
}

impl KeyFileCredentials {
    /// Credentials stored under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read(&self, name: &str) -> String {
        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(value) => value.trim().to_string(),
            Err(e) => {
                tracing::warn!("No ambient {} at {}: {}", name, path.display(), e);
                String::new()
            }
        }
    }
}

impl AmbientCredentials for KeyFileCredentials {
    fn access_key(&self) -> AccessKey {
        AccessKey::new(self.read("akId"), self.read("akSecret"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticCredentials;

    fn no_ambient() -> StaticCredentials {
        StaticCredentials::new("", "")
    }

    fn parse(json: &str) -> Result<VolumeRequest, ValidationError> {
        VolumeOptions::from_json(json)?.into_request(&no_ambient())
    }

    #[test]
    fn test_full_kubelet_payload() {
        let request = parse(
            r#"{
                "akId": "id1",
                "akSecret": "sec1",
                "bucket": "oss",
                "kubernetes.io/fsType": "",
                "kubernetes.io/pod.name": "nginx-oss-deploy-f995c89f4-kj25b",
                "kubernetes.io/pod.namespace": "default",
                "kubernetes.io/pod.uid": "e000259c-4dac-11e8-a884-04163e0f011e",
                "kubernetes.io/pvOrVolumeName": "oss1",
                "kubernetes.io/readwrite": "rw",
                "kubernetes.io/serviceAccount.name": "default",
                "otherOpts": "-o max_stat_cache_size=0 -o allow_other",
                "url": "oss-cn-hangzhou.aliyuncs.com"
            }"#,
        )
        .unwrap();

        assert_eq!(request.bucket, "oss");
        assert_eq!(request.url, "oss-cn-hangzhou.aliyuncs.com");
        assert_eq!(request.volume_name, "oss1");
        assert_eq!(request.credentials.id, "id1");
        assert_eq!(request.credentials.secret(), "sec1");
        assert_eq!(
            request.extra_flags,
            ["-o", "max_stat_cache_size=0", "-o", "allow_other"]
        );
        assert_eq!((request.uid, request.gid), (0, 0));
        assert_eq!(request.subpath, None);
    }

    #[test]
    fn test_empty_bucket_or_url() {
        assert_eq!(
            parse(r#"{"bucket":"","url":"oss.example.com"}"#).unwrap_err(),
            ValidationError::MissingEndpoint
        );
        assert_eq!(
            parse(r#"{"bucket":"b"}"#).unwrap_err(),
            ValidationError::MissingEndpoint
        );
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = VolumeOptions::from_json(r#"{"bucket":"b","url":"u","readOnly":"true"}"#)
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownOption("readOnly".to_string()));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            VolumeOptions::from_json("not json").unwrap_err(),
            ValidationError::Malformed(_)
        ));
        assert!(matches!(
            VolumeOptions::from_json(r#"{"bucket": 7}"#).unwrap_err(),
            ValidationError::Malformed(_)
        ));
    }

    #[test]
    fn test_secret_keys_override_plaintext() {
        let request = parse(
            r#"{"bucket":"b","url":"u","akId":"plain","akSecret":"plain",
                "kubernetes.io/secret/akId":"aWQy",
                "kubernetes.io/secret/akSecret":"c2VjMg=="}"#,
        )
        .unwrap();
        assert_eq!(request.credentials.id, "id2");
        assert_eq!(request.credentials.secret(), "sec2");
    }

    #[test]
    fn test_secret_decode_failure() {
        let err = parse(
            r#"{"bucket":"b","url":"u",
                "kubernetes.io/secret/akId":"aWQy",
                "kubernetes.io/secret/akSecret":"%%%"}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::SecretDecode {
                field: "kubernetes.io/secret/akSecret"
            }
        );
    }

    #[test]
    fn test_decoded_secrets_are_trimmed() {
        // "id2\n" and "sec2\n", as produced by `echo id2 | base64`
        let request = parse(
            r#"{"bucket":"b","url":"u",
                "kubernetes.io/secret/akId":"aWQyCg==",
                "kubernetes.io/secret/akSecret":"c2VjMgo="}"#,
        )
        .unwrap();
        assert_eq!(request.credentials.id, "id2");
        assert_eq!(request.credentials.secret(), "sec2");
    }

    #[test]
    fn test_credential_separators_rejected() {
        let err = parse(r#"{"bucket":"b","url":"u","akId":"id1","akSecret":"sec:ret"}"#)
            .unwrap_err();
        assert_eq!(err, ValidationError::CredentialSeparator { field: "akSecret" });

        let err = parse(r#"{"bucket":"b","url":"u","akId":"id\n1","akSecret":"sec1"}"#)
            .unwrap_err();
        assert_eq!(err, ValidationError::CredentialSeparator { field: "akId" });

        let err = parse(r#"{"bucket":"a:b","url":"u","akId":"id1","akSecret":"sec1"}"#)
            .unwrap_err();
        assert_eq!(err, ValidationError::CredentialSeparator { field: "bucket" });

        let ambient = StaticCredentials::new("node-id", "node\rsecret");
        let err = VolumeOptions::from_json(r#"{"bucket":"b","url":"u"}"#)
            .unwrap()
            .into_request(&ambient)
            .unwrap_err();
        assert_eq!(err, ValidationError::CredentialSeparator { field: "akSecret" });
    }

    #[test]
    fn test_ambient_fallback_when_key_missing() {
        let ambient = StaticCredentials::new("node-id", "node-secret");
        let request = VolumeOptions::from_json(r#"{"bucket":"b","url":"u","akId":"only-id"}"#)
            .unwrap()
            .into_request(&ambient)
            .unwrap();
        assert_eq!(request.credentials.id, "node-id");
        assert_eq!(request.credentials.secret(), "node-secret");
    }

    #[test]
    fn test_key_file_credentials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("akId"), "file-id\n").unwrap();
        std::fs::write(dir.path().join("akSecret"), "file-secret\n").unwrap();

        let key = KeyFileCredentials::new(dir.path()).access_key();
        assert_eq!(key.id, "file-id");
        assert_eq!(key.secret(), "file-secret");

        let missing = KeyFileCredentials::new(dir.path().join("nope")).access_key();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_other_opts_prefix() {
        let err = parse(r#"{"bucket":"b","url":"u","otherOpts":"max_stat_cache_size=0"}"#)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::OtherOptsFormat("max_stat_cache_size=0".to_string())
        );

        let request = parse(r#"{"bucket":"b","url":"u","otherOpts":"-o ro"}"#).unwrap();
        assert_eq!(request.extra_flags, ["-o", "ro"]);
    }

    #[test]
    fn test_uid_gid() {
        let request = parse(r#"{"bucket":"b","url":"u","uid":"1000","gid":""}"#).unwrap();
        assert_eq!((request.uid, request.gid), (1000, 0));

        let err = parse(r#"{"bucket":"b","url":"u","uid":"nobody"}"#).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidId {
                field: "uid",
                value: "nobody".to_string()
            }
        );
        assert!(err.to_string().contains("nobody"));

        let err = parse(r#"{"bucket":"b","url":"u","gid":"-1"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidId { field: "gid", .. }));
    }

    #[test]
    fn test_subpath_normalized() {
        let request = parse(r#"{"bucket":"b","url":"u","subpath":"/data/./logs/"}"#).unwrap();
        assert_eq!(request.subpath, Some(PathBuf::from("data/logs")));

        let request = parse(r#"{"bucket":"b","url":"u","subpath":"/"}"#).unwrap();
        assert_eq!(request.subpath, None);

        let err = parse(r#"{"bucket":"b","url":"u","subpath":"a/../../etc"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::SubpathEscapes(_)));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let options = VolumeOptions::from_json(
            r#"{"bucket":"b","url":"u","akSecret":"hunter2",
                "kubernetes.io/secret/akSecret":"aHVudGVyMg=="}"#,
        )
        .unwrap();
        let rendered = format!("{options:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("aHVudGVyMg=="));

        let key = AccessKey::new("id", "hunter2");
        assert!(!format!("{key:?}").contains("hunter2"));
    }
}
