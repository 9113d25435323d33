use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit,
    dto::users::{CreateUserRequest, UpdateUserRequest, UserList},
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_CASHIER, ensure_admin, is_known_role},
    models::User,
    response::{ApiResponse, Meta},
    services::auth_service::hash_password,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 6;

fn check_role(role: &str) -> AppResult<()> {
    if !is_known_role(role) {
        return Err(AppError::Validation(format!("Unknown role {role:?}")));
    }
    Ok(())
}

fn check_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub async fn list_users(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let items: Vec<User> = Users::find()
        .order_by_asc(UserCol::Username)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(1, total.max(1), total)),
    ))
}

pub async fn create_user(
    state: &AppState,
    user: &AuthUser,
    payload: CreateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;

    let username = payload.username.trim().to_string();
    let name = payload.name.trim().to_string();
    if username.is_empty() || name.is_empty() {
        return Err(AppError::Validation("Username and name are required".into()));
    }
    check_password(&payload.password)?;
    let role = payload.role.unwrap_or_else(|| ROLE_CASHIER.to_string());
    check_role(&role)?;

    let taken = Users::find()
        .filter(UserCol::Username.eq(username.as_str()))
        .one(&state.orm)
        .await?;
    if taken.is_some() {
        return Err(AppError::Validation("Username is already taken".into()));
    }

    let created = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username),
        name: Set(name),
        password_hash: Set(hash_password(&payload.password)?),
        role: Set(role),
        is_active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        user.user_id,
        "user_create",
        "users",
        json!({ "user_id": created.id, "role": created.role }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created",
        User::from(created),
        Some(Meta::empty()),
    ))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let mut active: UserActive = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Name must not be empty".into()));
        }
        active.name = Set(name);
    }
    if let Some(role) = payload.role {
        check_role(&role)?;
        active.role = Set(role);
    }
    if let Some(is_active) = payload.is_active {
        if !is_active && id == user.user_id {
            return Err(AppError::Validation("You cannot deactivate yourself".into()));
        }
        active.is_active = Set(is_active);
    }
    if let Some(password) = payload.password {
        check_password(&password)?;
        active.password_hash = Set(hash_password(&password)?);
    }

    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        user.user_id,
        "user_update",
        "users",
        json!({ "user_id": updated.id, "at": Utc::now() }),
    )
    .await;

    Ok(ApiResponse::success(
        "User updated",
        User::from(updated),
        Some(Meta::empty()),
    ))
}

/// Users with recorded orders stay; deactivate them instead.
pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::Validation("You cannot delete yourself".into()));
    }

    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(id))
        .count(&state.orm)
        .await?;
    if orders > 0 {
        return Err(AppError::Validation(
            "User has recorded orders; deactivate the account instead".into(),
        ));
    }

    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    audit::record(
        &state.pool,
        user.user_id,
        "user_delete",
        "users",
        json!({ "user_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        json!({}),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_known_roles_are_accepted() {
        assert!(check_role("admin").is_ok());
        assert!(check_role("cashier").is_ok());
        assert!(matches!(check_role("owner"), Err(AppError::Validation(_))));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(check_password("abc").is_err());
        assert!(check_password("kasir123").is_ok());
    }
}
