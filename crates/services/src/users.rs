//! Identity: registration, login and profile edits over the `UserRepo` port.

use std::sync::Arc;

use domains::{
    Actor, CredentialHasher, DomainError, NewUser, Result, StorageError, User, UserRepo,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::support::{non_empty, storage_failure, StorageResultExt};

const MIN_PASSWORD_LEN: usize = 8;

/// Fields a user may change on their own profile. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepo>,
    hasher: Arc<dyn CredentialHasher>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepo>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { users, hasher }
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        let username = non_empty(username, "username")?;
        let email = validate_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let password_hash = self.hasher.hash_password(password).await?;
        let user = self
            .users
            .create_user(NewUser { username, email, password_hash })
            .await
            .map_err(conflict_or_internal)?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Looks the user up by email or username and checks the password.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<User> {
        let login = login.trim();
        let found = if login.contains('@') {
            self.users.find_by_email(&login.to_lowercase()).await
        } else {
            self.users.find_by_username(login).await
        };

        if let Some(user) = found.or_internal("load user")? {
            if self.hasher.verify_password(password, &user.password_hash).await {
                return Ok(user);
            }
        }
        warn!("authentication failed");
        Err(DomainError::Permission("invalid credentials".into()))
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        self.users
            .find_by_id(id)
            .await
            .or_internal("load user")?
            .ok_or_else(|| DomainError::not_found("User", id))
    }

    pub async fn update_profile(&self, actor: Actor, update: ProfileUpdate) -> Result<User> {
        let mut user = self.get_user(actor.user_id()?).await?;
        if let Some(username) = update.username {
            user.username = non_empty(&username, "username")?;
        }
        if let Some(email) = update.email {
            user.email = validate_email(&email)?;
        }
        if let Some(picture) = update.profile_picture {
            user.profile_picture = Some(picture).filter(|p| !p.trim().is_empty());
        }

        self.users.update_user(user).await.map_err(conflict_or_internal)
    }
}

fn validate_email(raw: &str) -> Result<String> {
    let email = non_empty(raw, "email")?.to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DomainError::Validation("invalid email format".into())),
    }
}

fn conflict_or_internal(err: StorageError) -> DomainError {
    match err {
        StorageError::Conflict(what) => DomainError::Conflict(format!("{what} is already taken")),
        other => storage_failure("save user", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{MockCredentialHasher, MockUserRepo};

    fn stored(username: &str, email: &str, hash: &str) -> User {
        User {
            id: Uuid::now_v7(),
            username: username.into(),
            email: email.into(),
            password_hash: hash.into(),
            profile_picture: None,
            created_at: Utc::now(),
        }
    }

    fn hasher() -> MockCredentialHasher {
        let mut hasher = MockCredentialHasher::new();
        hasher.expect_hash_password().returning(|p| Ok(format!("hashed:{p}")));
        hasher.expect_verify_password().returning(|p, h| h == format!("hashed:{p}"));
        hasher
    }

    #[tokio::test]
    async fn register_hashes_and_normalizes() {
        let mut repo = MockUserRepo::new();
        repo.expect_create_user()
            .withf(|u| u.email == "ada@example.com" && u.password_hash == "hashed:correct horse")
            .returning(|u| Ok(stored(&u.username, &u.email, &u.password_hash)));

        let svc = UserService::new(Arc::new(repo), Arc::new(hasher()));
        let user = svc.register(" ada ", "Ada@Example.com", "correct horse").await.unwrap();
        assert_eq!(user.username, "ada");
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let mut repo = MockUserRepo::new();
        repo.expect_create_user().returning(|_| Err(StorageError::Conflict("email".into())));

        let svc = UserService::new(Arc::new(repo), Arc::new(hasher()));
        let err = svc.register("ada", "ada@example.com", "long enough").await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn weak_input_is_rejected_before_hashing() {
        let svc = UserService::new(Arc::new(MockUserRepo::new()), Arc::new(MockCredentialHasher::new()));
        assert!(matches!(svc.register("ada", "nope", "long enough").await, Err(DomainError::Validation(_))));
        assert!(matches!(svc.register("ada", "a@b.c", "short").await, Err(DomainError::Validation(_))));
        assert!(matches!(svc.register("", "a@b.c", "long enough").await, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn authenticate_by_username_or_email() {
        let user = stored("ada", "ada@example.com", "hashed:secret123");
        let (by_name, by_mail) = (user.clone(), user.clone());
        let mut repo = MockUserRepo::new();
        repo.expect_find_by_username().returning(move |_| Ok(Some(by_name.clone())));
        repo.expect_find_by_email().returning(move |_| Ok(Some(by_mail.clone())));

        let svc = UserService::new(Arc::new(repo), Arc::new(hasher()));
        assert_eq!(svc.authenticate("ada", "secret123").await.unwrap().id, user.id);
        assert_eq!(svc.authenticate("ADA@example.com", "secret123").await.unwrap().id, user.id);
        assert!(matches!(svc.authenticate("ada", "wrong").await, Err(DomainError::Permission(_))));
    }

    #[tokio::test]
    async fn profile_updates_need_a_user() {
        let svc = UserService::new(Arc::new(MockUserRepo::new()), Arc::new(MockCredentialHasher::new()));
        let err = svc.update_profile(Actor::Anonymous, ProfileUpdate::default()).await.unwrap_err();
        assert!(matches!(err, DomainError::Permission(_)));
    }
}
