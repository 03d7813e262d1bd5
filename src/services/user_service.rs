use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

use super::{require_admin, ServiceError, ServiceResult};
use crate::access::{Principal, DEFAULT_ROLE};
use crate::audit::{AuditEvent, AuditRecorder, RequestMeta};
use crate::auth::{self, IssuedToken};
use crate::database::models::{NewUser, User, UserChanges, UserFilter, UserWithRoles};
use crate::database::{DatabaseError, Store};
use crate::error::{MSG_ACCOUNT_INACTIVE, MSG_FORBIDDEN, MSG_INVALID_CREDENTIALS, MSG_UNAUTHORIZED};
use crate::types::{AuditAction, ResourceType, UserStatus};
use crate::validation::{normalize_email, ValidatedRequest};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

pub const MSG_EMAIL_TAKEN: &str = "Email already registered";
pub const MSG_USER_NOT_FOUND: &str = "User not found";
pub const MSG_NOT_PENDING: &str = "User is not pending approval";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

impl ValidatedRequest for RegisterRequest {
    const FIELD_ORDER: &'static [&'static str] = &["full_name", "email", "password"];
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl ValidatedRequest for LoginRequest {
    const FIELD_ORDER: &'static [&'static str] = &["email", "password"];
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Full name must be between 1 and 255 characters"))]
    pub full_name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    /// Honoured for admins only
    pub status: Option<UserStatus>,
}

impl ValidatedRequest for UpdateUserRequest {
    const FIELD_ORDER: &'static [&'static str] = &["full_name", "email", "password"];
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListQuery {
    pub status: Option<UserStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRolesRequest {
    pub role_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub user: UserWithRoles,
}

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    #[serde(flatten)]
    pub user: UserWithRoles,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
    audit: AuditRecorder,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    /// Self-registration. The account starts `pending` until an admin approves it.
    pub async fn register(&self, request: RegisterRequest, meta: &RequestMeta) -> ServiceResult<User> {
        let request = RegisterRequest {
            email: normalize_email(&request.email),
            ..request
        };
        request.check()?;

        if self.store.find_user_by_email(&request.email).await?.is_some() {
            return Err(ServiceError::Conflict(MSG_EMAIL_TAKEN.into()));
        }

        let password_hash = auth::hash_password(&request.password)?;
        let role_ids = self
            .store
            .find_role_by_name(DEFAULT_ROLE)
            .await?
            .map(|role| vec![role.id])
            .unwrap_or_default();

        let user = self
            .store
            .insert_user(&NewUser {
                email: request.email,
                password_hash,
                full_name: request.full_name,
                status: UserStatus::Pending,
                role_ids,
            })
            .await
            .map_err(email_conflict)?;

        tracing::info!("registered user {} ({}), awaiting approval", user.id, user.email);

        self.audit
            .record(
                AuditEvent::new(AuditAction::Register, ResourceType::User)
                    .actor(user.id)
                    .resource(user.id)
                    .detail(json!({ "email": user.email }))
                    .request(meta),
            )
            .await?;

        Ok(user)
    }

    /// Verify credentials and issue a session token. Every attempt is audited.
    pub async fn login(&self, request: LoginRequest, meta: &RequestMeta) -> ServiceResult<LoginResponse> {
        let request = LoginRequest {
            email: normalize_email(&request.email),
            ..request
        };
        request.check()?;

        let user = match self.store.find_user_by_email(&request.email).await? {
            Some(user) => user,
            None => {
                let error = ServiceError::Unauthenticated(MSG_INVALID_CREDENTIALS.into());
                return self.reject_login(None, &request.email, "unknown email", meta, error).await;
            }
        };

        if !auth::verify_password(&request.password, &user.password_hash)? {
            let error = ServiceError::Unauthenticated(MSG_INVALID_CREDENTIALS.into());
            return self.reject_login(Some(user.id), &user.email, "wrong password", meta, error).await;
        }

        if user.status != UserStatus::Active {
            let error = ServiceError::forbidden(MSG_ACCOUNT_INACTIVE);
            return self.reject_login(Some(user.id), &user.email, "account not active", meta, error).await;
        }

        self.store.touch_last_login(user.id).await?;
        let roles = self.store.user_role_names(user.id).await?;
        let token = auth::issue_token(user.id, &user.email, roles.clone())?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Login, ResourceType::User)
                    .actor(user.id)
                    .resource(user.id)
                    .request(meta),
            )
            .await?;

        let user = self.store.find_user(user.id).await?.unwrap_or(user);
        Ok(LoginResponse {
            token,
            user: UserWithRoles { user, roles },
        })
    }

    async fn reject_login<T>(
        &self,
        user_id: Option<i64>,
        email: &str,
        reason: &str,
        meta: &RequestMeta,
        error: ServiceError,
    ) -> ServiceResult<T> {
        tracing::warn!("login rejected for {}: {}", email, reason);

        let mut event = AuditEvent::new(AuditAction::Login, ResourceType::User)
            .detail(json!({ "email": email, "reason": reason }))
            .request(meta)
            .failed();
        if let Some(id) = user_id {
            event = event.actor(id).resource(id);
        }
        self.audit.record(event).await?;

        Err(error)
    }

    /// Reload the session's user. Only active accounts may use the API, and the
    /// role set always comes from the store rather than the token.
    pub async fn session(&self, user_id: i64) -> ServiceResult<(User, Principal)> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::Unauthenticated(MSG_UNAUTHORIZED.into()))?;

        if user.status != UserStatus::Active {
            return Err(ServiceError::forbidden(MSG_ACCOUNT_INACTIVE));
        }

        let roles = self.store.user_role_names(user.id).await?;
        Ok((user, Principal::new(user_id, roles)))
    }

    pub async fn whoami(&self, principal: &Principal) -> ServiceResult<WhoAmI> {
        let user = self.load(principal.user_id).await?;
        Ok(WhoAmI {
            user: self.with_roles(user).await?,
            is_admin: principal.is_admin(),
        })
    }

    /// New token carrying the principal's current roles
    pub async fn refresh(&self, principal: &Principal) -> ServiceResult<IssuedToken> {
        let user = self.load(principal.user_id).await?;
        let roles = principal.roles.iter().cloned().collect();
        Ok(auth::issue_token(user.id, &user.email, roles)?)
    }

    /// One page of users with their role names, newest first
    pub async fn list(&self, principal: &Principal, query: UserListQuery) -> ServiceResult<Vec<UserWithRoles>> {
        require_admin(principal)?;

        let filter = UserFilter {
            status: query.status,
            limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: query.offset.unwrap_or(0).max(0),
        };
        let (users, assignments) =
            futures::try_join!(self.store.list_users(&filter), self.store.all_user_role_names())?;

        let mut roles_by_user: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for (user_id, role) in assignments {
            roles_by_user.entry(user_id).or_default().push(role);
        }

        Ok(users
            .into_iter()
            .map(|user| {
                let roles = roles_by_user.remove(&user.id).unwrap_or_default();
                UserWithRoles { user, roles }
            })
            .collect())
    }

    pub async fn get(&self, principal: &Principal, id: i64) -> ServiceResult<UserWithRoles> {
        require_self_or_admin(principal, id)?;
        let user = self.load(id).await?;
        self.with_roles(user).await
    }

    /// Partial profile update. `status` is silently ignored unless the caller is an
    /// admin, and must follow [`UserStatus::can_transition_to`].
    pub async fn update(&self, principal: &Principal, id: i64, request: UpdateUserRequest) -> ServiceResult<User> {
        require_self_or_admin(principal, id)?;
        let request = UpdateUserRequest {
            email: request.email.as_deref().map(normalize_email),
            ..request
        };
        request.check()?;

        let current = self.load(id).await?;

        let status = match request.status.filter(|_| principal.is_admin()) {
            Some(next) if next == current.status => None,
            Some(UserStatus::Active) if current.status == UserStatus::Pending => {
                return Err(ServiceError::validation("status", "Use approve to activate a pending user"));
            }
            Some(next) if !current.status.can_transition_to(next) => {
                return Err(ServiceError::validation(
                    "status",
                    format!("Cannot change user status from {} to {}", current.status, next),
                ));
            }
            other => other,
        };

        if let Some(email) = request.email.as_deref() {
            if email != current.email && self.store.find_user_by_email(email).await?.is_some() {
                return Err(ServiceError::Conflict(MSG_EMAIL_TAKEN.into()));
            }
        }

        let password_hash = match request.password.as_deref() {
            Some(password) => Some(auth::hash_password(password)?),
            None => None,
        };

        let changes = UserChanges {
            full_name: request.full_name,
            email: request.email,
            password_hash,
            status,
        };

        if changes.is_empty() {
            return Ok(current);
        }

        let user = self
            .store
            .update_user(id, &changes)
            .await
            .map_err(email_conflict)?
            .ok_or_else(|| ServiceError::not_found(MSG_USER_NOT_FOUND))?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Update, ResourceType::User)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "updated": changes.touched() })),
            )
            .await?;

        Ok(user)
    }

    /// Hard delete. Audit rows referring to the user are kept.
    pub async fn delete(&self, principal: &Principal, id: i64) -> ServiceResult<()> {
        require_admin(principal)?;
        if principal.is_self(id) {
            return Err(ServiceError::invalid("Cannot delete your own account"));
        }

        let user = self.load(id).await?;
        if !self.store.delete_user(id).await? {
            return Err(ServiceError::not_found(MSG_USER_NOT_FOUND));
        }

        self.audit
            .record(
                AuditEvent::new(AuditAction::Delete, ResourceType::User)
                    .actor(principal.user_id)
                    .resource(id)
                    .detail(json!({ "email": user.email })),
            )
            .await?;

        Ok(())
    }

    pub async fn approve(&self, principal: &Principal, id: i64) -> ServiceResult<User> {
        require_admin(principal)?;
        let user = self.load(id).await?;
        self.activate(user, Some(principal.user_id)).await
    }

    /// Approval from the operator console, recorded with no actor
    pub async fn approve_email(&self, email: &str) -> ServiceResult<User> {
        let user = self
            .store
            .find_user_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_USER_NOT_FOUND))?;
        self.activate(user, None).await
    }

    async fn activate(&self, user: User, actor: Option<i64>) -> ServiceResult<User> {
        if user.status != UserStatus::Pending {
            return Err(ServiceError::invalid(MSG_NOT_PENDING));
        }

        let changes = UserChanges {
            status: Some(UserStatus::Active),
            ..Default::default()
        };
        let approved = self
            .store
            .update_user(user.id, &changes)
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_USER_NOT_FOUND))?;

        tracing::info!("approved user {} ({})", approved.id, approved.email);

        let mut event = AuditEvent::new(AuditAction::Approve, ResourceType::User)
            .resource(approved.id)
            .detail(json!({ "email": approved.email }));
        if let Some(actor) = actor {
            event = event.actor(actor);
        }
        self.audit.record(event).await?;

        Ok(approved)
    }

    /// Replace the user's role set
    pub async fn set_roles(&self, principal: &Principal, id: i64, request: SetRolesRequest) -> ServiceResult<UserWithRoles> {
        require_admin(principal)?;
        let user = self.load(id).await?;

        let mut role_ids = request.role_ids;
        role_ids.sort_unstable();
        role_ids.dedup();

        let mut names = Vec::with_capacity(role_ids.len());
        for role_id in &role_ids {
            let role = self
                .store
                .find_role(*role_id)
                .await?
                .ok_or_else(|| ServiceError::not_found(format!("Role {role_id} not found")))?;
            names.push(role.name);
        }

        self.store
            .replace_user_roles(user.id, &role_ids, Some(principal.user_id))
            .await?;

        self.audit
            .record(
                AuditEvent::new(AuditAction::Assign, ResourceType::User)
                    .actor(principal.user_id)
                    .resource(user.id)
                    .detail(json!({ "roles": names })),
            )
            .await?;

        self.with_roles(user).await
    }

    async fn load(&self, id: i64) -> ServiceResult<User> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(MSG_USER_NOT_FOUND))
    }

    async fn with_roles(&self, user: User) -> ServiceResult<UserWithRoles> {
        let roles = self.store.user_role_names(user.id).await?;
        Ok(UserWithRoles { user, roles })
    }
}

fn require_self_or_admin(principal: &Principal, id: i64) -> ServiceResult<()> {
    if principal.is_self(id) || principal.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::forbidden(MSG_FORBIDDEN))
    }
}

fn email_conflict(err: DatabaseError) -> ServiceError {
    match err {
        DatabaseError::Conflict(_) => ServiceError::Conflict(MSG_EMAIL_TAKEN.into()),
        other => other.into(),
    }
}
