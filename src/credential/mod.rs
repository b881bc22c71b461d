/// Credential evaluation
///
/// Registration, login evaluation with brute-force lockout and dormancy
/// detection, verification-token flows, and password change/reset.

pub mod password;
mod service;
mod verification;

pub use service::CredentialService;
pub use verification::VerificationTokenStore;
