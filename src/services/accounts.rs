use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{hash_password, verify_password, AuthService, Capability};
use crate::entities::{role, user};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

pub const ADMIN_ROLE: &str = "admin";
pub const MEMBER_ROLE: &str = "member";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterInput {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginInput {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileInput {
    #[validate(email)]
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// A successful login: the signed token plus the user it identifies.
#[derive(Debug)]
pub struct AuthSession {
    pub token: String,
    pub user: user::Model,
    pub capability: Capability,
}

/// Registration, login and profile management.
#[derive(Clone)]
pub struct AccountService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
    event_sender: EventSender,
}

impl AccountService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        auth: Arc<AuthService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            auth,
            event_sender,
        }
    }

    /// Creates a new customer account with the non-privileged role.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn register(&self, input: RegisterInput) -> Result<user::Model, ServiceError> {
        input.validate()?;

        let username_taken = user::Entity::find()
            .filter(user::Column::Username.eq(&input.username))
            .one(self.db.as_ref())
            .await?
            .is_some();
        if username_taken {
            return Err(ServiceError::Conflict("Username already taken".into()));
        }

        let email_taken = user::Entity::find()
            .filter(user::Column::Email.eq(&input.email))
            .one(self.db.as_ref())
            .await?
            .is_some();
        if email_taken {
            return Err(ServiceError::Conflict("Email already registered".into()));
        }

        let member_role = role::Entity::find()
            .filter(role::Column::Name.eq(MEMBER_ROLE))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("member role is not seeded".into())
            })?;

        let password_hash = hash_password(&input.password)?;

        let created = user::ActiveModel {
            username: Set(input.username),
            password_hash: Set(password_hash),
            email: Set(input.email),
            full_name: Set(input.full_name),
            phone: Set(input.phone),
            address: Set(input.address),
            role_id: Set(member_role.id),
            registered_at: Set(Utc::now()),
            last_login_at: Set(None),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        info!(user_id = created.id, "registered new user");
        self.event_sender
            .send_or_log(Event::UserRegistered(created.id))
            .await;

        Ok(created)
    }

    /// Verifies credentials and issues a token carrying the capability
    /// resolved from the user's role.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn login(&self, input: LoginInput) -> Result<AuthSession, ServiceError> {
        input.validate()?;

        let user = user::Entity::find()
            .filter(user::Column::Username.eq(&input.username))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Invalid username or password".into()))?;

        if !verify_password(&input.password, &user.password_hash)? {
            return Err(ServiceError::Unauthorized(
                "Invalid username or password".into(),
            ));
        }

        if !user.is_active {
            return Err(ServiceError::Forbidden("Account is disabled".into()));
        }

        let capability = match role::Entity::find_by_id(user.role_id)
            .one(self.db.as_ref())
            .await?
        {
            Some(r) => Capability::from_role_name(&r.name),
            None => Capability::Member,
        };

        let token = self
            .auth
            .issue_token(user.id, &user.username, capability, input.remember_me)?;

        let mut active: user::ActiveModel = user.into();
        active.last_login_at = Set(Some(Utc::now()));
        let user = active.update(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::UserLoggedIn(user.id))
            .await;

        Ok(AuthSession {
            token,
            user,
            capability,
        })
    }

    #[instrument(skip(self))]
    pub async fn profile(&self, user_id: i32) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    /// Partial profile update; email uniqueness is re-checked excluding
    /// the caller's own row.
    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        user_id: i32,
        input: UpdateProfileInput,
    ) -> Result<user::Model, ServiceError> {
        input.validate()?;

        let user = self.profile(user_id).await?;

        if let Some(email) = &input.email {
            let taken = user::Entity::find()
                .filter(user::Column::Email.eq(email))
                .filter(user::Column::Id.ne(user_id))
                .one(self.db.as_ref())
                .await?
                .is_some();
            if taken {
                return Err(ServiceError::Conflict("Email already registered".into()));
            }
        }

        let mut active: user::ActiveModel = user.into();
        if let Some(email) = input.email {
            active.email = Set(email);
        }
        if let Some(full_name) = input.full_name {
            active.full_name = Set(Some(full_name));
        }
        if let Some(phone) = input.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(address) = input.address {
            active.address = Set(Some(address));
        }

        Ok(active.update(self.db.as_ref()).await?)
    }
}
