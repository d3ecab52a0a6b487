mod error;
pub mod login_state;
pub mod saml;
pub mod session;

pub use error::AuthError;
pub use login_state::LoginState;
pub use saml::{
    AuthnRequestRedirect, IdentityAssertion, SamlError, SamlServiceProvider, ServiceProvider,
};
pub use session::SessionManager;
