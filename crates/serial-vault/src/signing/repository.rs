//! The storage operations the signer depends on.

use async_trait::async_trait;

use crate::storage::{
    Account, DatabaseError, Keypair, Model, NewSigningLog, Nonce, SigningLogEntry, SubStore,
    VaultDatabase,
};

/// Repository view used by [`super::Signer`]. Implemented by
/// [`VaultDatabase`]; tests substitute their own.
#[async_trait]
pub trait SigningRepository: Send + Sync {
    async fn find_model(
        &self,
        brand_id: &str,
        name: &str,
        api_key: &str,
    ) -> Result<Model, DatabaseError>;

    async fn get_model(&self, id: i64) -> Result<Model, DatabaseError>;

    async fn get_keypair(&self, id: i64) -> Result<Keypair, DatabaseError>;

    async fn get_account(&self, authority_id: &str) -> Result<Account, DatabaseError>;

    async fn get_substore(
        &self,
        from_model_id: i64,
        serial_number: &str,
    ) -> Result<Option<SubStore>, DatabaseError>;

    async fn create_nonce(&self, now: i64) -> Result<Nonce, DatabaseError>;

    async fn validate_and_consume_nonce(
        &self,
        nonce: &str,
        now: i64,
        ttl_secs: i64,
    ) -> Result<bool, DatabaseError>;

    async fn delete_expired_nonces(&self, cutoff: i64) -> Result<u64, DatabaseError>;

    async fn check_for_duplicate(&self, entry: &NewSigningLog) -> Result<bool, DatabaseError>;

    async fn create_signing_log(
        &self,
        entry: &NewSigningLog,
    ) -> Result<SigningLogEntry, DatabaseError>;
}

#[async_trait]
impl SigningRepository for VaultDatabase {
    async fn find_model(
        &self,
        brand_id: &str,
        name: &str,
        api_key: &str,
    ) -> Result<Model, DatabaseError> {
        Self::find_model(self, brand_id, name, api_key).await
    }

    async fn get_model(&self, id: i64) -> Result<Model, DatabaseError> {
        Self::get_model(self, id).await
    }

    async fn get_keypair(&self, id: i64) -> Result<Keypair, DatabaseError> {
        Self::get_keypair(self, id).await
    }

    async fn get_account(&self, authority_id: &str) -> Result<Account, DatabaseError> {
        Self::get_account(self, authority_id).await
    }

    async fn get_substore(
        &self,
        from_model_id: i64,
        serial_number: &str,
    ) -> Result<Option<SubStore>, DatabaseError> {
        Self::get_substore(self, from_model_id, serial_number).await
    }

    async fn create_nonce(&self, now: i64) -> Result<Nonce, DatabaseError> {
        Self::create_nonce(self, now).await
    }

    async fn validate_and_consume_nonce(
        &self,
        nonce: &str,
        now: i64,
        ttl_secs: i64,
    ) -> Result<bool, DatabaseError> {
        Self::validate_and_consume_nonce(self, nonce, now, ttl_secs).await
    }

    async fn delete_expired_nonces(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        Self::delete_expired_nonces(self, cutoff).await
    }

    async fn check_for_duplicate(&self, entry: &NewSigningLog) -> Result<bool, DatabaseError> {
        Self::check_for_duplicate(self, entry).await
    }

    async fn create_signing_log(
        &self,
        entry: &NewSigningLog,
    ) -> Result<SigningLogEntry, DatabaseError> {
        Self::create_signing_log(self, entry).await
    }
}
