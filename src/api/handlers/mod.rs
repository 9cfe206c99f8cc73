pub mod admission;
pub mod health;
pub mod login;
pub mod mfa;
pub mod principal;

pub use self::principal::Principal;
pub use self::admission::TrustedProxies;
