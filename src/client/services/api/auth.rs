use super::ApiClient;
use crate::common::error::ApiError;
use crate::common::models::{
    Ack, AuthSession, EmailRequest, RegisterRequest, SignInRequest, User, VerifyAccountRequest,
    VerifyResetOtpRequest,
};

impl ApiClient {
    /// Signs in and stores the returned session as the current identity.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, ApiError> {
        let body = SignInRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let session: AuthSession = self.post("users/signin", &body).await?;
        self.session
            .save(&session)
            .map_err(|e| ApiError::Transport(format!("could not persist session: {}", e)))?;
        Ok(session)
    }

    pub fn sign_out(&self) -> Result<(), ApiError> {
        self.session
            .clear()
            .map_err(|e| ApiError::Transport(format!("could not clear session: {}", e)))
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        self.post("users/register", request).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<Ack, ApiError> {
        self.post("users/forgot-password", &EmailRequest { email: email.trim().to_string() }).await
    }

    pub async fn verify_reset_otp(&self, request: &VerifyResetOtpRequest) -> Result<Ack, ApiError> {
        self.post("users/verify-reset-otp", request).await
    }

    pub async fn verify_account(&self, user_id: &str, code: &str) -> Result<Ack, ApiError> {
        let body = VerifyAccountRequest { code: code.trim().to_string() };
        self.post(&format!("users/{}/verify", user_id), &body).await
    }

    pub async fn resend_verification(&self, email: &str) -> Result<Ack, ApiError> {
        self.post("users/resend-verification", &EmailRequest { email: email.trim().to_string() }).await
    }
}
