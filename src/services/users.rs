use crate::{
    auth::{hash_password, verify_password, TokenService},
    errors::ServiceError,
    models::{normalize_email, Role, User, VerificationCode},
    notifications::{EmailTemplate, NotificationDispatcher},
    store::{Collection, Store},
};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::EnumString;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RegisterAction {
    SendVerification,
    VerifyEmail,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
    #[validate(length(max = 100))]
    pub name: Option<String>,
    /// `send_verification`, `verify_email`, or absent for direct registration
    pub action: Option<String>,
    pub verification_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TelegramLinkRequest {
    pub chat_id: i64,
    pub telegram_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    #[schema(value_type = Object)]
    pub user: Value,
}

/// Outcome of a registration call: either a pending verification or a session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum RegisterResponse {
    VerificationSent { success: bool, message: String },
    Registered(AuthResponse),
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

/// Accounts: registration, login and profile updates.
#[derive(Clone)]
pub struct UserService {
    store: Store,
    notifier: NotificationDispatcher,
    code_ttl: Duration,
}

impl UserService {
    pub fn new(store: Store, notifier: NotificationDispatcher, code_ttl_secs: u64) -> Self {
        Self {
            store,
            notifier,
            code_ttl: Duration::seconds(i64::try_from(code_ttl_secs).unwrap_or(i64::MAX / 1000)),
        }
    }

    pub async fn find(&self, user_id: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.store.get::<User>(Collection::Users, user_id).await?)
    }

    /// Resolves the signed-in account and fails unless it carries the admin role.
    pub async fn require_admin(&self, user_id: &str) -> Result<User, ServiceError> {
        let user = self
            .find(user_id)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Unknown account".into()))?;
        if user.role != Role::Admin {
            warn!(user_id, "Admin action refused");
            return Err(ServiceError::Forbidden("Admin role required".into()));
        }
        Ok(user)
    }

    async fn ensure_unregistered(&self, email: &str) -> Result<(), ServiceError> {
        if self.find(email).await?.is_some() {
            return Err(ServiceError::Conflict(format!("{email} is already registered")));
        }
        Ok(())
    }

    fn required_password(request: &RegisterRequest) -> Result<&str, ServiceError> {
        request
            .password
            .as_deref()
            .ok_or_else(|| ServiceError::ValidationError("Password is required".into()))
    }

    #[instrument(skip(self, request, tokens), fields(action = request.action.as_deref().unwrap_or("direct")))]
    pub async fn register(
        &self,
        request: RegisterRequest,
        tokens: &TokenService,
    ) -> Result<RegisterResponse, ServiceError> {
        request.validate()?;
        let action = match request.action.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            None => None,
            Some(raw) => Some(
                raw.parse::<RegisterAction>()
                    .map_err(|_| ServiceError::BadRequest(format!("Unknown action: {raw}")))?,
            ),
        };

        match action {
            Some(RegisterAction::SendVerification) => self.send_verification(&request).await,
            Some(RegisterAction::VerifyEmail) => self
                .verify_email(&request, tokens)
                .await
                .map(RegisterResponse::Registered),
            None => self
                .register_direct(&request, tokens)
                .await
                .map(RegisterResponse::Registered),
        }
    }

    async fn send_verification(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisterResponse, ServiceError> {
        let email = normalize_email(&request.email);
        let password = Self::required_password(request)?;
        self.ensure_unregistered(&email).await?;

        let record = VerificationCode {
            email: email.clone(),
            code: generate_code(),
            password_hash: hash_password(password)?,
            name: request.name.clone(),
            expires_at: Utc::now() + self.code_ttl,
            attempts: 0,
        };
        self.store
            .put(Collection::VerificationCodes, &email, &record)
            .await?;

        let template = EmailTemplate::EmailVerification {
            code: record.code.clone(),
            ttl_minutes: u64::try_from(self.code_ttl.num_minutes()).unwrap_or(0),
        };
        if let Err(e) = self.notifier.send_email(&email, &template).await {
            warn!(email = %email, error = %e, "Verification e-mail not delivered");
        }

        info!(email = %email, "Verification code issued");
        Ok(RegisterResponse::VerificationSent {
            success: true,
            message: "Verification code sent".into(),
        })
    }

    async fn verify_email(
        &self,
        request: &RegisterRequest,
        tokens: &TokenService,
    ) -> Result<AuthResponse, ServiceError> {
        let email = normalize_email(&request.email);
        let submitted = request
            .verification_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::ValidationError("verificationCode is required".into()))?;

        let mut record = self
            .store
            .get::<VerificationCode>(Collection::VerificationCodes, &email)
            .await?
            .ok_or_else(|| ServiceError::BadRequest("No pending verification for this e-mail".into()))?;

        if record.is_expired(Utc::now()) {
            self.store.delete(Collection::VerificationCodes, &email).await?;
            return Err(ServiceError::BadRequest("Verification code expired".into()));
        }
        if record.attempts >= VerificationCode::MAX_ATTEMPTS {
            self.store.delete(Collection::VerificationCodes, &email).await?;
            return Err(ServiceError::BadRequest("Too many attempts, request a new code".into()));
        }
        if record.code != submitted {
            record.attempts += 1;
            self.store
                .put(Collection::VerificationCodes, &email, &record)
                .await?;
            warn!(email = %email, attempts = record.attempts, "Wrong verification code");
            return Err(ServiceError::BadRequest("Invalid verification code".into()));
        }

        self.ensure_unregistered(&email).await?;
        let mut user = User::new_with_email(&email);
        user.password_hash = Some(record.password_hash);
        user.name = record.name.or_else(|| request.name.clone());
        user.email_verified = true;
        self.store.put(Collection::Users, &user.id, &user).await?;
        self.store.delete(Collection::VerificationCodes, &email).await?;

        info!(user_id = %user.id, "User registered with verified e-mail");
        self.welcome(&user);
        self.session(&user, tokens)
    }

    async fn register_direct(
        &self,
        request: &RegisterRequest,
        tokens: &TokenService,
    ) -> Result<AuthResponse, ServiceError> {
        let email = normalize_email(&request.email);
        let password = Self::required_password(request)?;
        self.ensure_unregistered(&email).await?;

        let mut user = User::new_with_email(&email);
        user.password_hash = Some(hash_password(password)?);
        user.name = request.name.clone();
        self.store.put(Collection::Users, &user.id, &user).await?;

        info!(user_id = %user.id, "User registered");
        self.welcome(&user);
        self.session(&user, tokens)
    }

    fn welcome(&self, user: &User) {
        if let Some(email) = user.email.clone() {
            self.notifier.spawn_email(
                email,
                EmailTemplate::Welcome {
                    name: user.name.clone(),
                },
            );
        }
    }

    fn session(&self, user: &User, tokens: &TokenService) -> Result<AuthResponse, ServiceError> {
        Ok(AuthResponse {
            success: true,
            token: tokens.issue(&user.id, user.email.as_deref())?,
            user: user.profile(),
        })
    }

    #[instrument(skip(self, request, tokens), fields(email = %request.email))]
    pub async fn login(
        &self,
        request: LoginRequest,
        tokens: &TokenService,
    ) -> Result<AuthResponse, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let user = self.find(&email).await?;

        let authenticated = user.filter(|u| {
            u.password_hash
                .as_deref()
                .is_some_and(|hash| verify_password(&request.password, hash))
        });
        match authenticated {
            Some(user) => {
                info!(user_id = %user.id, "User logged in");
                self.session(&user, tokens)
            }
            None => {
                warn!("Failed login attempt");
                Err(ServiceError::Unauthorized("Invalid email or password".into()))
            }
        }
    }

    pub async fn profile(&self, user_id: &str) -> Result<Value, ServiceError> {
        self.find(user_id)
            .await?
            .map(|user| user.profile())
            .ok_or_else(|| ServiceError::NotFound(format!("User {user_id} not found")))
    }

    /// Stores the chat the bot may use for this user.
    #[instrument(skip(self))]
    pub async fn link_telegram(
        &self,
        user_id: &str,
        chat_id: i64,
        telegram_id: Option<i64>,
    ) -> Result<Value, ServiceError> {
        let mut user = self
            .find(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {user_id} not found")))?;
        user.telegram_chat_id = Some(chat_id);
        if telegram_id.is_some() {
            user.telegram_id = telegram_id;
        }
        self.store.put(Collection::Users, &user.id, &user).await?;
        info!(user_id = %user.id, "Telegram chat linked");
        Ok(user.profile())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn service(store: &Store) -> UserService {
        UserService::new(
            store.clone(),
            NotificationDispatcher::new(store.clone(), "https://x"),
            900,
        )
    }

    fn tokens() -> TokenService {
        TokenService::new("test-secret", 3600)
    }

    fn register(email: &str, action: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: Some("sweet123".into()),
            name: Some("Anna".into()),
            action: action.map(str::to_string),
            verification_code: None,
        }
    }

    #[tokio::test]
    async fn two_step_registration() {
        let store = Store::in_memory();
        let service = service(&store);

        let sent = service
            .register(register("Anna@Example.com", Some("send_verification")), &tokens())
            .await
            .unwrap();
        assert_matches!(sent, RegisterResponse::VerificationSent { success: true, .. });

        let pending: VerificationCode = store
            .get(Collection::VerificationCodes, "anna@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.code.len(), 6);

        let mut verify = register("anna@example.com", Some("verify_email"));
        verify.password = None;
        verify.verification_code = Some(pending.code.clone());
        let registered = service.register(verify, &tokens()).await.unwrap();
        match registered {
            RegisterResponse::Registered(auth) => {
                assert_eq!(auth.user["emailVerified"], true);
                assert_eq!(tokens().validate(&auth.token).unwrap().user_id, "anna@example.com");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(store
            .get::<VerificationCode>(Collection::VerificationCodes, "anna@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn wrong_codes_count_attempts_until_locked() {
        let store = Store::in_memory();
        let service = service(&store);
        service
            .register(register("anna@example.com", Some("send_verification")), &tokens())
            .await
            .unwrap();

        for _ in 0..VerificationCode::MAX_ATTEMPTS {
            let mut verify = register("anna@example.com", Some("verify_email"));
            verify.verification_code = Some("not-it".into());
            assert_matches!(
                service.register(verify, &tokens()).await,
                Err(ServiceError::BadRequest(msg)) if msg == "Invalid verification code"
            );
        }

        let mut verify = register("anna@example.com", Some("verify_email"));
        verify.verification_code = Some("not-it".into());
        assert_matches!(
            service.register(verify, &tokens()).await,
            Err(ServiceError::BadRequest(msg)) if msg.starts_with("Too many attempts")
        );
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let store = Store::in_memory();
        let record = VerificationCode {
            email: "anna@example.com".into(),
            code: "123456".into(),
            password_hash: hash_password("sweet123").unwrap(),
            name: None,
            expires_at: Utc::now() - Duration::minutes(1),
            attempts: 0,
        };
        store
            .put(Collection::VerificationCodes, "anna@example.com", &record)
            .await
            .unwrap();

        let mut verify = register("anna@example.com", Some("verify_email"));
        verify.verification_code = Some("123456".into());
        assert_matches!(
            service(&store).register(verify, &tokens()).await,
            Err(ServiceError::BadRequest(msg)) if msg == "Verification code expired"
        );
    }

    #[tokio::test]
    async fn direct_registration_then_login() {
        let store = Store::in_memory();
        let service = service(&store);
        service
            .register(register("anna@example.com", None), &tokens())
            .await
            .unwrap();

        assert_matches!(
            service.register(register("anna@example.com", None), &tokens()).await,
            Err(ServiceError::Conflict(_))
        );

        let login = service
            .login(
                LoginRequest {
                    email: "ANNA@example.com".into(),
                    password: "sweet123".into(),
                },
                &tokens(),
            )
            .await
            .unwrap();
        assert!(login.user.get("passwordHash").is_none());

        assert_matches!(
            service
                .login(
                    LoginRequest {
                        email: "anna@example.com".into(),
                        password: "wrong-pass".into(),
                    },
                    &tokens(),
                )
                .await,
            Err(ServiceError::Unauthorized(_))
        );
    }

    #[tokio::test]
    async fn short_password_and_unknown_action_are_rejected() {
        let store = Store::in_memory();
        let service = service(&store);
        let mut short = register("anna@example.com", None);
        short.password = Some("12345".into());
        assert_matches!(
            service.register(short, &tokens()).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            service
                .register(register("anna@example.com", Some("magic_link")), &tokens())
                .await,
            Err(ServiceError::BadRequest(_))
        );
    }

    #[tokio::test]
    async fn telegram_link_is_stored() {
        let store = Store::in_memory();
        let user = User::new_with_email("anna@example.com");
        store.put(Collection::Users, &user.id, &user).await.unwrap();

        let profile = service(&store)
            .link_telegram("anna@example.com", 555, Some(42))
            .await
            .unwrap();
        assert_eq!(profile["telegramLinked"], true);
        let stored: User = store.get(Collection::Users, "anna@example.com").await.unwrap().unwrap();
        assert_eq!(stored.telegram_chat_id, Some(555));
        assert_eq!(stored.telegram_id, Some(42));
    }

    #[tokio::test]
    async fn only_admins_pass_the_admin_check() {
        let store = Store::in_memory();
        let customer = User::new_with_email("anna@example.com");
        let mut admin = User::new_with_email("boss@example.com");
        admin.role = Role::Admin;
        store.put(Collection::Users, &customer.id, &customer).await.unwrap();
        store.put(Collection::Users, &admin.id, &admin).await.unwrap();

        let service = service(&store);
        assert_eq!(service.require_admin("boss@example.com").await.unwrap().id, admin.id);
        assert_matches!(
            service.require_admin("anna@example.com").await,
            Err(ServiceError::Forbidden(_))
        );
        assert_matches!(
            service.require_admin("ghost@example.com").await,
            Err(ServiceError::Unauthorized(_))
        );
    }
}
