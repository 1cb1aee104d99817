use serde::Deserialize;
use std::fmt;

/// 账号凭据
///
/// `Debug` 输出不包含密码。
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// 账号名称（计划文件通过它选择账号）
    #[serde(rename = "name")]
    pub account: String,
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(
        account: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("default", "tutor", "geheim");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("tutor"));
        assert!(!printed.contains("geheim"));
    }
}
