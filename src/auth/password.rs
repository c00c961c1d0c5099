use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

pub const DEFAULT_BCRYPT_COST: u32 = 10;
/// bcrypt ignores every byte past this one.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Hashing scheme used for new passwords. Verification picks the scheme
/// from the stored hash, so both kinds can live in the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordScheme {
    Bcrypt { cost: u32 },
    Argon2,
}

impl Default for PasswordScheme {
    fn default() -> Self {
        PasswordScheme::Bcrypt {
            cost: DEFAULT_BCRYPT_COST,
        }
    }
}

impl PasswordScheme {
    pub fn parse(name: &str, bcrypt_cost: u32) -> anyhow::Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bcrypt" => Ok(PasswordScheme::Bcrypt { cost: bcrypt_cost }),
            "argon2" => Ok(PasswordScheme::Argon2),
            other => anyhow::bail!("unknown password scheme: {other}"),
        }
    }
}

pub fn hash_password(plain: &str, scheme: PasswordScheme) -> anyhow::Result<String> {
    match scheme {
        PasswordScheme::Bcrypt { cost } => Ok(bcrypt::hash(plain, cost)?),
        PasswordScheme::Argon2 => {
            let salt = SaltString::generate(&mut OsRng);
            let hash = Argon2::default()
                .hash_password(plain.as_bytes(), &salt)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?
                .to_string();
            Ok(hash)
        }
    }
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    if hash.starts_with("$argon2") {
        let parsed = PasswordHash::new(hash).map_err(|e| anyhow::anyhow!(e.to_string()))?;
        return Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok());
    }
    Ok(bcrypt::verify(plain, hash)?)
}
