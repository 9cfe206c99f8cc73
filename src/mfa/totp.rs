//! Time-based one-time passwords (RFC 6238, SHA-1, 6 digits).

use anyhow::{Result, anyhow};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use totp_rs::{Algorithm, Secret, TOTP};

use super::MfaConfig;

const DIGITS: usize = 6;
// Label used when only checking codes; it never reaches the user.
const VERIFY_LABEL: &str = "user";

/// Provisioning material shown once at enrollment.
#[derive(Debug)]
pub struct Provisioning {
    pub secret: String,
    pub otpauth_url: String,
    /// `data:image/png;base64,...`
    pub qr_code_url: String,
}

#[derive(Clone, Debug)]
pub struct TotpEngine {
    issuer: String,
    step: u64,
    window: u8,
    secret_length: usize,
}

impl TotpEngine {
    #[must_use]
    pub fn new(config: &MfaConfig) -> Self {
        Self {
            issuer: config.issuer().to_string(),
            step: config.step_seconds(),
            window: config.window(),
            secret_length: config.secret_length(),
        }
    }

    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    #[must_use]
    pub fn window(&self) -> u8 {
        self.window
    }

    /// Seconds a single code stays acceptable: `(2 × window + 1) × step`.
    #[must_use]
    pub fn acceptance_seconds(&self) -> u64 {
        let steps = u64::from(self.window).saturating_mul(2).saturating_add(1);
        self.step.saturating_mul(steps).max(1)
    }

    /// New random base32 secret of the configured byte length.
    ///
    /// # Errors
    /// Returns an error if the system RNG fails.
    pub fn generate_secret(&self) -> Result<SecretString> {
        let mut bytes = vec![0u8; self.secret_length];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| anyhow!("Secret gen error: {e}"))?;
        let Secret::Encoded(encoded) = Secret::Raw(bytes).to_encoded() else {
            return Err(anyhow!("Secret gen error: encoding failed"));
        };
        Ok(SecretString::from(encoded))
    }

    /// Authenticator URI and QR code for `secret`.
    ///
    /// # Errors
    /// Returns an error if the secret is malformed or the QR image cannot be rendered.
    pub fn provisioning(&self, secret: &SecretString, account: &str) -> Result<Provisioning> {
        let totp = self.totp(secret, account.to_string())?;
        let qr = totp
            .get_qr_base64()
            .map_err(|e| anyhow!("QR gen error: {e}"))?;
        Ok(Provisioning {
            secret: totp.get_secret_base32(),
            otpauth_url: totp.get_url(),
            qr_code_url: format!("data:image/png;base64,{qr}"),
        })
    }

    /// Whether `code` matches the step containing `now` or one of the
    /// `window` steps on either side. Comparison is constant-time.
    ///
    /// # Errors
    /// Returns an error if the stored secret is malformed.
    pub fn verify(&self, secret: &SecretString, code: &str, now: u64) -> Result<bool> {
        if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }
        let totp = self.totp(secret, VERIFY_LABEL.to_string())?;
        Ok(totp.check(code, now))
    }

    /// Code for the step containing `time`.
    ///
    /// # Errors
    /// Returns an error if the stored secret is malformed.
    pub fn code_at(&self, secret: &SecretString, time: u64) -> Result<String> {
        let totp = self.totp(secret, VERIFY_LABEL.to_string())?;
        Ok(totp.generate(time))
    }

    fn totp(&self, secret: &SecretString, account: String) -> Result<TOTP> {
        let bytes = Secret::Encoded(secret.expose_secret().to_string())
            .to_bytes()
            .map_err(|e| anyhow!("Invalid TOTP secret: {e:?}"))?;
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            self.window,
            self.step,
            bytes,
            Some(self.issuer.clone()),
            account,
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_010;

    fn engine() -> TotpEngine {
        TotpEngine::new(&MfaConfig::new())
    }

    #[test]
    fn generated_secrets_are_base32_of_configured_length() {
        let engine = engine();
        let secret = engine.generate_secret().unwrap();
        let bytes = Secret::Encoded(secret.expose_secret().to_string())
            .to_bytes()
            .unwrap();
        assert_eq!(bytes.len(), MfaConfig::new().secret_length());
        assert_ne!(
            engine.generate_secret().unwrap().expose_secret(),
            secret.expose_secret()
        );
    }

    #[test]
    fn accepts_current_and_drift_window() {
        let engine = engine();
        let secret = engine.generate_secret().unwrap();
        let step = engine.step();
        let window = u64::from(engine.window());

        for offset in 0..=window {
            let past = engine.code_at(&secret, NOW - offset * step).unwrap();
            let future = engine.code_at(&secret, NOW + offset * step).unwrap();
            assert!(engine.verify(&secret, &past, NOW).unwrap(), "-{offset} steps");
            assert!(engine.verify(&secret, &future, NOW).unwrap(), "+{offset} steps");
        }
    }

    #[test]
    fn rejects_codes_outside_the_window() {
        let engine = engine();
        let secret = engine.generate_secret().unwrap();
        let far = u64::from(engine.window()) + 1;
        let current = engine.code_at(&secret, NOW).unwrap();

        let old = engine.code_at(&secret, NOW - far * engine.step()).unwrap();
        if old != current {
            assert!(!engine.verify(&secret, &old, NOW).unwrap());
        }
        let ahead = engine.code_at(&secret, NOW + far * engine.step()).unwrap();
        if ahead != current {
            assert!(!engine.verify(&secret, &ahead, NOW).unwrap());
        }
    }

    #[test]
    fn rejects_malformed_codes() {
        let engine = engine();
        let secret = engine.generate_secret().unwrap();
        assert!(!engine.verify(&secret, "", NOW).unwrap());
        assert!(!engine.verify(&secret, "12345", NOW).unwrap());
        assert!(!engine.verify(&secret, "12a456", NOW).unwrap());
    }

    #[test]
    fn provisioning_includes_uri_and_qr() {
        let engine = engine();
        let secret = engine.generate_secret().unwrap();
        let provisioning = engine.provisioning(&secret, "admin").unwrap();
        assert_eq!(provisioning.secret, secret.expose_secret());
        assert!(provisioning.otpauth_url.starts_with("otpauth://totp/"));
        assert!(provisioning.otpauth_url.contains("admin"));
        assert!(provisioning.qr_code_url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn acceptance_spans_the_whole_window() {
        assert_eq!(engine().acceptance_seconds(), 150);
    }
}
