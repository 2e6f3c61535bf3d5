//! TPM 2.0 rooted wrapping keys, driven through the `tpm2-tools` binaries.
//!
//! First use creates a primary RSA key under the owner hierarchy (context
//! file recorded in setting `parent`) and a KeyedHash child made persistent
//! at a fixed handle (setting `keyed_hash_handle`). The wrapping key for a
//! pair is HMAC-SHA256 over `authority_id/key_id` inside the TPM; the
//! result is stored sealed under the operator secret in setting
//! `auth:<authority_id>/<key_id>` so later unseals skip the TPM.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_vault_core::config::KeystoreKind;
use serial_vault_crypto::seal::{KEY_SIZE, pair_label, seal, unseal};
use serial_vault_crypto::{WrappingKey, pad_secret};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::{KeystoreError, WrapKeySource, decode_sealed, encode_sealed};
use crate::storage::VaultDatabase;

const SETTING_PARENT: &str = "parent";
const SETTING_KEYED_HASH: &str = "keyed_hash_handle";

/// Runs one `tpm2_*` tool and returns its stdout.
///
/// Dropping the returned future must stop the tool; the operator relies on
/// that to keep at most one command talking to the TPM.
#[async_trait]
pub trait TpmCommand: Send + Sync {
    async fn run(&self, bin: &str, args: &[String]) -> Result<String, String>;
}

/// The real `tpm2-tools` binaries.
pub struct Tpm2Tools {
    tools_dir: Option<PathBuf>,
}

impl Tpm2Tools {
    pub const fn new(tools_dir: Option<PathBuf>) -> Self {
        Self { tools_dir }
    }
}

#[async_trait]
impl TpmCommand for Tpm2Tools {
    async fn run(&self, bin: &str, args: &[String]) -> Result<String, String> {
        let program = self
            .tools_dir
            .as_ref()
            .map_or_else(|| PathBuf::from(bin), |d| d.join(bin));
        let output = Command::new(&program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("spawn {bin}: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{bin} failed status={} stderr={}",
                output.status,
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

pub struct TpmKeys {
    db: VaultDatabase,
    secret: WrappingKey,
    command: Arc<dyn TpmCommand>,
    work_dir: PathBuf,
    handle: u32,
    timeout: Duration,
    /// The TPM is single-threaded; every command sequence holds this.
    device: Mutex<()>,
}

impl TpmKeys {
    pub fn new(
        db: VaultDatabase,
        secret: &str,
        command: Arc<dyn TpmCommand>,
        work_dir: PathBuf,
        handle: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            secret: pad_secret(secret),
            command,
            work_dir,
            handle,
            timeout,
            device: Mutex::new(()),
        }
    }

    /// Run a tool with the per-call deadline. On timeout the command future
    /// is dropped, which kills the child before `device` is released.
    async fn run(&self, bin: &'static str, args: Vec<String>) -> Result<String, KeystoreError> {
        match tokio::time::timeout(self.timeout, self.command.run(bin, &args)).await {
            Ok(Ok(stdout)) => Ok(stdout),
            Ok(Err(e)) => {
                warn!(bin, error = %e, "TPM command failed");
                Err(KeystoreError::SealOpaque)
            }
            Err(_) => {
                warn!(bin, timeout_ms = self.timeout.as_millis(), "TPM command timed out");
                Err(KeystoreError::SealOpaque)
            }
        }
    }

    async fn setting(&self, code: &str) -> Result<Option<String>, KeystoreError> {
        self.db
            .get_setting(code)
            .await
            .map(|s| s.map(|s| s.data))
            .map_err(|e| {
                warn!(code, error = %e, "Failed to read TPM setting");
                KeystoreError::SealOpaque
            })
    }

    async fn put_setting(&self, code: &str, data: &str) -> Result<(), KeystoreError> {
        self.db.put_setting(code, data).await.map_err(|e| {
            warn!(code, error = %e, "Failed to store TPM setting");
            KeystoreError::SealOpaque
        })
    }

    /// Persistent handle of the KeyedHash key, creating it on first use.
    /// Caller must hold `device`.
    async fn keyed_hash_handle(&self) -> Result<String, KeystoreError> {
        if let Some(handle) = self.setting(SETTING_KEYED_HASH).await? {
            return Ok(handle);
        }

        std::fs::create_dir_all(&self.work_dir).map_err(|e| {
            warn!(dir = %self.work_dir.display(), error = %e, "Cannot create TPM work directory");
            KeystoreError::SealOpaque
        })?;

        let parent = match self.setting(SETTING_PARENT).await? {
            Some(parent) => parent,
            None => {
                let ctx = path_arg(&self.work_dir.join("primary.ctx"))?;
                self.run(
                    "tpm2_createprimary",
                    args(&["-C", "o", "-g", "sha256", "-G", "rsa", "-c", &ctx]),
                )
                .await?;
                self.put_setting(SETTING_PARENT, &ctx).await?;
                ctx
            }
        };

        let public = path_arg(&self.work_dir.join("keyedhash.pub"))?;
        let private = path_arg(&self.work_dir.join("keyedhash.priv"))?;
        let context = path_arg(&self.work_dir.join("keyedhash.ctx"))?;
        let handle = format!("0x{:08x}", self.handle);

        self.run(
            "tpm2_create",
            args(&["-C", &parent, "-g", "sha256", "-G", "hmac", "-u", &public, "-r", &private]),
        )
        .await?;
        self.run(
            "tpm2_load",
            args(&["-C", &parent, "-u", &public, "-r", &private, "-c", &context]),
        )
        .await?;
        self.run(
            "tpm2_evictcontrol",
            args(&["-C", "o", "-c", &context, &handle]),
        )
        .await?;

        self.put_setting(SETTING_KEYED_HASH, &handle).await?;
        info!(handle = %handle, "TPM keyed-hash key created");
        Ok(handle)
    }

    /// HMAC-SHA256 of `label` under the persistent KeyedHash key.
    async fn hmac(&self, handle: &str, label: &str) -> Result<WrappingKey, KeystoreError> {
        let tmp = tempfile::tempdir().map_err(|_| KeystoreError::SealOpaque)?;
        let input = tmp.path().join("label.bin");
        let output = tmp.path().join("hmac.bin");
        std::fs::write(&input, label).map_err(|_| KeystoreError::SealOpaque)?;

        self.run(
            "tpm2_hmac",
            args(&[
                "-c",
                handle,
                "-g",
                "sha256",
                "-o",
                &path_arg(&output)?,
                &path_arg(&input)?,
            ]),
        )
        .await?;

        let digest = Zeroizing::new(std::fs::read(&output).map_err(|_| KeystoreError::SealOpaque)?);
        to_wrapping_key(&digest)
    }

    fn open_auth(&self, text: &str) -> Result<WrappingKey, KeystoreError> {
        let sealed = decode_sealed(text)?;
        let digest = unseal(&self.secret, &sealed).map_err(|_| KeystoreError::SealOpaque)?;
        to_wrapping_key(&digest)
    }
}

#[async_trait]
impl WrapKeySource for TpmKeys {
    fn kind(&self) -> KeystoreKind {
        KeystoreKind::Tpm
    }

    async fn wrapping_key(
        &self,
        authority_id: &str,
        key_id: &str,
    ) -> Result<WrappingKey, KeystoreError> {
        let label = pair_label(authority_id, key_id);
        let code = format!("auth:{label}");
        if let Some(text) = self.setting(&code).await? {
            return self.open_auth(&text);
        }

        let _device = self.device.lock().await;
        // Another caller may have filled it while we waited.
        if let Some(text) = self.setting(&code).await? {
            return self.open_auth(&text);
        }

        let handle = self.keyed_hash_handle().await?;
        let key = self.hmac(&handle, &label).await?;
        let sealed = seal(&self.secret, key.as_slice()).map_err(|_| KeystoreError::SealOpaque)?;
        self.put_setting(&code, &encode_sealed(&sealed)).await?;
        Ok(key)
    }
}

fn to_wrapping_key(digest: &[u8]) -> Result<WrappingKey, KeystoreError> {
    if digest.len() != KEY_SIZE {
        warn!(len = digest.len(), "TPM HMAC has unexpected length");
        return Err(KeystoreError::SealOpaque);
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(digest);
    Ok(key)
}

fn path_arg(path: &Path) -> Result<String, KeystoreError> {
    path.to_str()
        .map(String::from)
        .ok_or(KeystoreError::SealOpaque)
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serial_vault_crypto::PrivateKey;
    use serial_vault_crypto::seal::hmac_sha256;

    use super::*;
    use crate::keypair::{KeypairOperator, SealingOperator};

    /// Software stand-in: records invocations and computes `tpm2_hmac`
    /// with a fixed key.
    #[derive(Default)]
    struct SoftTpm {
        calls: StdMutex<Vec<String>>,
        delay: Option<Duration>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl SoftTpm {
        fn calls(&self, bin: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == bin).count()
        }
    }

    /// Counts a command as running until dropped, cancelled or not.
    struct Running<'a>(&'a AtomicUsize);

    impl Drop for Running<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TpmCommand for SoftTpm {
        async fn run(&self, bin: &str, args: &[String]) -> Result<String, String> {
            self.calls.lock().unwrap().push(bin.to_string());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            let _running = Running(&self.running);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if bin == "tpm2_hmac" {
                let out = args
                    .iter()
                    .position(|a| a == "-o")
                    .and_then(|i| args.get(i + 1))
                    .ok_or("no -o")?;
                let input = args.last().ok_or("no input")?;
                let label = std::fs::read(input).map_err(|e| e.to_string())?;
                std::fs::write(out, hmac_sha256(b"soft-tpm", &label)).map_err(|e| e.to_string())?;
            }
            Ok(String::new())
        }
    }

    async fn tpm_keys(tpm: Arc<SoftTpm>, timeout: Duration) -> (TpmKeys, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = VaultDatabase::open_in_memory().await.unwrap();
        let keys = TpmKeys::new(
            db,
            "s3cret",
            tpm,
            dir.path().to_path_buf(),
            0x8101_0002,
            timeout,
        );
        (keys, dir)
    }

    #[tokio::test]
    async fn first_use_provisions_then_caches() {
        let tpm = Arc::new(SoftTpm::default());
        let (keys, _dir) = tpm_keys(Arc::clone(&tpm), Duration::from_secs(3)).await;

        let first = keys.wrapping_key("system", "k1").await.unwrap();
        assert_eq!(tpm.calls("tpm2_createprimary"), 1);
        assert_eq!(tpm.calls("tpm2_evictcontrol"), 1);
        assert_eq!(tpm.calls("tpm2_hmac"), 1);
        assert_eq!(
            keys.db.get_setting("keyed_hash_handle").await.unwrap().unwrap().data,
            "0x81010002"
        );

        let again = keys.wrapping_key("system", "k1").await.unwrap();
        assert_eq!(*first, *again);
        assert_eq!(tpm.calls("tpm2_hmac"), 1);

        keys.wrapping_key("system", "k2").await.unwrap();
        assert_eq!(tpm.calls("tpm2_hmac"), 2);
        assert_eq!(tpm.calls("tpm2_createprimary"), 1);
    }

    #[tokio::test]
    async fn stored_auth_is_sealed() {
        let tpm = Arc::new(SoftTpm::default());
        let (keys, _dir) = tpm_keys(tpm, Duration::from_secs(3)).await;
        let key = keys.wrapping_key("system", "k1").await.unwrap();
        let stored = keys.db.get_setting("auth:system/k1").await.unwrap().unwrap();
        assert_ne!(decode_sealed(&stored.data).unwrap(), key.to_vec());
    }

    #[tokio::test]
    async fn seal_roundtrip_through_tpm() {
        let tpm = Arc::new(SoftTpm::default());
        let (keys, _dir) = tpm_keys(tpm, Duration::from_secs(3)).await;
        let operator = SealingOperator::new(keys);

        let key = PrivateKey::generate_ed25519();
        let key_id = key.public_key().key_id().unwrap();
        let sealed = operator
            .import("system", &key_id, key.to_pem().unwrap().as_bytes())
            .await
            .unwrap();
        operator.unseal("system", &key_id, &sealed).await.unwrap();
        assert!(operator.cache().contains("system", &key_id).await);
    }

    #[tokio::test]
    async fn slow_tpm_times_out_as_opaque() {
        let tpm = Arc::new(SoftTpm {
            delay: Some(Duration::from_millis(300)),
            ..SoftTpm::default()
        });
        let (keys, _dir) = tpm_keys(tpm, Duration::from_millis(50)).await;
        assert!(matches!(
            keys.wrapping_key("system", "k1").await,
            Err(KeystoreError::SealOpaque)
        ));
    }

    #[tokio::test]
    async fn timed_out_commands_never_overlap() {
        let tpm = Arc::new(SoftTpm {
            delay: Some(Duration::from_millis(400)),
            ..SoftTpm::default()
        });
        let (keys, _dir) = tpm_keys(Arc::clone(&tpm), Duration::from_millis(50)).await;

        let (k1, k2, k3) = tokio::join!(
            keys.wrapping_key("system", "k1"),
            keys.wrapping_key("system", "k2"),
            keys.wrapping_key("system", "k3"),
        );
        for result in [k1, k2, k3] {
            assert!(matches!(result, Err(KeystoreError::SealOpaque)));
        }
        assert_eq!(tpm.calls("tpm2_createprimary"), 3);
        assert_eq!(tpm.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(tpm.running.load(Ordering::SeqCst), 0);
    }
}
