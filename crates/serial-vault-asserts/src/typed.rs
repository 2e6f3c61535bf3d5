//! Typed views over decoded assertions.

use serial_vault_crypto::{PublicKey, digest_matches_id, sha3_384};

use crate::assertion::{Assertion, AssertionKind, AssertionView};
use crate::error::AssertsError;

macro_rules! typed_assertion {
    ($(#[$meta:meta])* $name:ident, $kind:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(Assertion);

        impl AssertionView for $name {
            fn assertion(&self) -> &Assertion {
                &self.0
            }
        }

        impl TryFrom<Assertion> for $name {
            type Error = AssertsError;

            fn try_from(a: Assertion) -> Result<Self, Self::Error> {
                if a.kind() == $kind {
                    Ok(Self(a))
                } else {
                    Err(AssertsError::malformed(format!(
                        "expected a {} assertion, got {}",
                        $kind,
                        a.kind()
                    )))
                }
            }
        }

        impl $name {
            pub fn into_inner(self) -> Assertion {
                self.0
            }
        }
    };
}

typed_assertion!(
    /// Binds an `authority_id` to a display name.
    AccountAssertion,
    AssertionKind::Account
);
typed_assertion!(
    /// Publishes a signing key for an account.
    AccountKeyAssertion,
    AssertionKind::AccountKey
);
typed_assertion!(ModelAssertion, AssertionKind::Model);
typed_assertion!(
    /// A device's self-signed request for a serial.
    SerialRequest,
    AssertionKind::SerialRequest
);
typed_assertion!(SerialAssertion, AssertionKind::Serial);
typed_assertion!(SystemUserAssertion, AssertionKind::SystemUser);

/// Any assertion, tagged by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedAssertion {
    AccountKey(AccountKeyAssertion),
    Account(AccountAssertion),
    Model(ModelAssertion),
    SerialRequest(SerialRequest),
    Serial(SerialAssertion),
    SystemUser(SystemUserAssertion),
}

impl From<Assertion> for TypedAssertion {
    fn from(a: Assertion) -> Self {
        match a.kind() {
            AssertionKind::AccountKey => Self::AccountKey(AccountKeyAssertion(a)),
            AssertionKind::Account => Self::Account(AccountAssertion(a)),
            AssertionKind::Model => Self::Model(ModelAssertion(a)),
            AssertionKind::SerialRequest => Self::SerialRequest(SerialRequest(a)),
            AssertionKind::Serial => Self::Serial(SerialAssertion(a)),
            AssertionKind::SystemUser => Self::SystemUser(SystemUserAssertion(a)),
        }
    }
}

impl AssertionView for TypedAssertion {
    fn assertion(&self) -> &Assertion {
        match self {
            Self::AccountKey(a) => a.assertion(),
            Self::Account(a) => a.assertion(),
            Self::Model(a) => a.assertion(),
            Self::SerialRequest(a) => a.assertion(),
            Self::Serial(a) => a.assertion(),
            Self::SystemUser(a) => a.assertion(),
        }
    }
}

/// Value of a `name: value` line inside a body.
fn body_field<'a>(body: &'a [u8], name: &str) -> Option<&'a str> {
    std::str::from_utf8(body).ok()?.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == name).then(|| unquote(v.trim()))
    })
}

/// Strip one pair of matching YAML quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

impl AccountAssertion {
    pub fn account_id(&self) -> &str {
        self.header_string("account-id")
    }
}

impl AccountKeyAssertion {
    pub fn account_id(&self) -> &str {
        self.header_string("account-id")
    }

    pub fn public_key_id(&self) -> &str {
        self.header_string("public-key-sha3-384")
    }

    /// The published key, checked against `public-key-sha3-384`.
    pub fn public_key(&self) -> Result<PublicKey, AssertsError> {
        let text = std::str::from_utf8(self.body())
            .map_err(|_| AssertsError::malformed("account-key body is not text"))?;
        let key = PublicKey::from_base64(text)?;
        if !digest_matches_id(&sha3_384(&key.to_der()?), self.public_key_id()) {
            return Err(AssertsError::malformed(
                "account-key body does not hash to public-key-sha3-384",
            ));
        }
        Ok(key)
    }
}

impl ModelAssertion {
    pub fn brand_id(&self) -> &str {
        self.header_string("brand-id")
    }

    pub fn model(&self) -> &str {
        self.header_string("model")
    }
}

impl SerialRequest {
    pub fn brand_id(&self) -> &str {
        self.header_string("brand-id")
    }

    pub fn model(&self) -> &str {
        self.header_string("model")
    }

    pub fn request_id(&self) -> &str {
        self.header_string("request-id")
    }

    /// The `serial` header, or the `serial:` line of the body when the
    /// header is absent. Empty when neither carries one.
    pub fn serial(&self) -> &str {
        let header = self.header_string("serial");
        if header.is_empty() {
            body_field(self.body(), "serial").unwrap_or("")
        } else {
            header
        }
    }

    pub fn device_key_text(&self) -> &str {
        self.header_string("device-key")
    }

    pub fn device_key(&self) -> Result<PublicKey, AssertsError> {
        Ok(PublicKey::from_base64(self.device_key_text())?)
    }

    /// Check the request is signed by its own `device-key`.
    pub fn verify_self_signed(&self) -> Result<PublicKey, AssertsError> {
        let key = self.device_key()?;
        self.0.verify(&key)?;
        Ok(key)
    }

    pub fn original_brand_id(&self) -> &str {
        self.header_string("original-brand-id")
    }

    pub fn original_model(&self) -> &str {
        self.header_string("original-model")
    }

    pub fn original_serial(&self) -> &str {
        self.header_string("original-serial")
    }

    /// A remodel names the brand, model and serial the device holds now.
    pub fn is_remodel(&self) -> bool {
        !(self.original_brand_id().is_empty()
            || self.original_model().is_empty()
            || self.original_serial().is_empty())
    }
}

impl SerialAssertion {
    pub fn brand_id(&self) -> &str {
        self.header_string("brand-id")
    }

    pub fn model(&self) -> &str {
        self.header_string("model")
    }

    pub fn serial(&self) -> &str {
        self.header_string("serial")
    }

    pub fn device_key_text(&self) -> &str {
        self.header_string("device-key")
    }

    /// Id of the key that signed this serial.
    pub fn sign_key_id(&self) -> &str {
        self.header_string("sign-key-sha3-384")
    }
}

impl SystemUserAssertion {
    pub fn username(&self) -> &str {
        self.header_string("username")
    }

    pub fn ssh_keys(&self) -> Vec<String> {
        self.header("ssh-keys")
            .map(crate::headers::HeaderValue::string_items)
            .unwrap_or_default()
    }
}
