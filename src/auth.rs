use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;
use tracing::debug;

/// One shared cleartext password for every user name.
///
/// The pgwire user is only a login label; booking ownership is carried in
/// each statement's `name` column.
#[derive(Debug)]
pub struct ClassbookAuthSource {
    password: String,
}

impl ClassbookAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for ClassbookAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        debug!("login attempt as {:?}", login.user());
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
