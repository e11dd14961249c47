use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::auth::password::{hash_password, verify_password};
use crate::error::AppError;
use crate::models::user::User;
use crate::store::Page;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub phone: String,
    pub full_name: String,
    pub password: String,
    pub default_delivery_address: Option<String>,
    pub default_delivery_city: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub phone: Option<String>,
    pub full_name: Option<String>,
    pub default_delivery_address: Option<String>,
    pub default_delivery_city: Option<String>,
    pub password: Option<String>,
}

/// Registered accounts, indexed by id and by email.
#[derive(Default)]
pub struct UserDirectory {
    users: DashMap<i64, User>,
    by_email: DashMap<String, i64>,
    last_id: AtomicI64,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn register(&self, new: NewUser, now: DateTime<Utc>) -> Result<User, AppError> {
        let email = new.email.trim().to_string();
        if email.is_empty()
            || new.phone.trim().is_empty()
            || new.full_name.trim().is_empty()
            || new.password.is_empty()
        {
            return Err(AppError::BadRequest(
                "email, phone, full_name and password are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(AppError::BadRequest("email is not valid".to_string()));
        }
        check_password(&new.password)?;

        let password_hash = hash_password(&new.password)
            .map_err(|err| AppError::Internal(format!("failed to hash password: {err}")))?;

        match self.by_email.entry(email.clone()) {
            Entry::Occupied(_) => Err(AppError::BadRequest(
                "email already registered".to_string(),
            )),
            Entry::Vacant(slot) => {
                let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
                let user = User {
                    id,
                    email,
                    phone: new.phone,
                    full_name: new.full_name,
                    password_hash,
                    default_delivery_address: new.default_delivery_address,
                    default_delivery_city: new.default_delivery_city,
                    is_active: true,
                    created_at: now,
                    updated_at: None,
                };

                self.users.insert(id, user.clone());
                slot.insert(id);
                Ok(user)
            }
        }
    }

    pub fn authenticate(&self, email: &str, password: &str) -> Option<User> {
        let user = self.find_by_email(email.trim())?;
        verify_password(password, &user.password_hash).then_some(user)
    }

    pub fn find_by_email(&self, email: &str) -> Option<User> {
        let id = *self.by_email.get(email)?;
        self.get(id)
    }

    pub fn get(&self, id: i64) -> Option<User> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    /// Ordered by id.
    pub fn list(&self, page: Page) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        users.sort_by_key(|user| user.id);

        users.into_iter().skip(page.skip).take(page.limit).collect()
    }

    pub fn update(
        &self,
        id: i64,
        changes: UserChanges,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let password_hash = match &changes.password {
            Some(password) => {
                check_password(password)?;
                Some(hash_password(password).map_err(|err| {
                    AppError::Internal(format!("failed to hash password: {err}"))
                })?)
            }
            None => None,
        };

        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

        if let Some(phone) = changes.phone {
            user.phone = phone;
        }
        if let Some(full_name) = changes.full_name {
            user.full_name = full_name;
        }
        if let Some(address) = changes.default_delivery_address {
            user.default_delivery_address = Some(address);
        }
        if let Some(city) = changes.default_delivery_city {
            user.default_delivery_city = Some(city);
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }
        user.updated_at = Some(now);

        Ok(user.clone())
    }
}

fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{NewUser, UserChanges, UserDirectory};
    use crate::error::AppError;

    fn new_user(email: &str, password: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            phone: "+10000000".to_string(),
            full_name: "Test Pilot".to_string(),
            password: password.to_string(),
            default_delivery_address: Some("Runway 9".to_string()),
            default_delivery_city: None,
        }
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let directory = UserDirectory::new();
        directory
            .register(new_user("a@example.com", "secret1"), Utc::now())
            .unwrap();

        let err = directory
            .register(new_user("a@example.com", "secret2"), Utc::now())
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn short_password_is_rejected() {
        let directory = UserDirectory::new();
        let err = directory
            .register(new_user("a@example.com", "123"), Utc::now())
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(directory.is_empty());
    }

    #[test]
    fn authenticate_checks_password() {
        let directory = UserDirectory::new();
        directory
            .register(new_user("a@example.com", "secret1"), Utc::now())
            .unwrap();

        assert!(directory.authenticate("a@example.com", "secret1").is_some());
        assert!(directory.authenticate("a@example.com", "wrong!!").is_none());
        assert!(directory.authenticate("b@example.com", "secret1").is_none());
    }

    #[test]
    fn password_change_takes_effect() {
        let directory = UserDirectory::new();
        let user = directory
            .register(new_user("a@example.com", "secret1"), Utc::now())
            .unwrap();

        directory
            .update(
                user.id,
                UserChanges {
                    password: Some("secret2".to_string()),
                    ..UserChanges::default()
                },
                Utc::now(),
            )
            .unwrap();

        assert!(directory.authenticate("a@example.com", "secret1").is_none());
        assert!(directory.authenticate("a@example.com", "secret2").is_some());
    }
}
