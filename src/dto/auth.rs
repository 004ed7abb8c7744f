use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    /// Boundary validation, checked before the uniqueness lookup.
    pub fn validate(&self) -> Result<(), String> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') || email.len() > 255 {
            return Err("email must be a valid email address".into());
        }
        if self.password.len() < 8 {
            return Err("password must be at least 8 characters".into());
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
}

/// JWT payload: subject is the user id, role gates the admin routes.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn accepts_reasonable_credentials() {
        assert!(request("amina@glowhub.co.ke", "s3cret-pass").validate().is_ok());
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(request("", "s3cret-pass").validate().is_err());
        assert!(request("not-an-email", "s3cret-pass").validate().is_err());
    }

    #[test]
    fn rejects_short_password() {
        let err = request("amina@glowhub.co.ke", "short").validate().unwrap_err();
        assert!(err.contains("password"));
    }
}
