use meridian_store::Store;
use meridian_store::entities::UserPatch;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{CreateUserMetadata, UpdateUserMetadata, UserView};

pub async fn create_user(store: &Store, caller: &AuthUser, meta: CreateUserMetadata) -> ApiResult<UserView> {
    caller.require_admin()?;

    if let Some(ref globus_id) = meta.globus_id
        && store
            .get_user_by_external_id(globus_id)
            .await
            .map_err(ApiError::StoreFailure)?
            .is_some()
    {
        return Err(ApiError::Conflict("a user with that federated identity already exists".to_string()));
    }

    let user = meridian_store::entities::User {
        id: Uuid::new_v4(),
        name: meta.name,
        email: meta.email,
        phone: meta.phone,
        institution: meta.institution,
        token: Uuid::new_v4().to_string(),
        external_id: meta.globus_id,
        admin: meta.admin,
    };

    let created = store.create_user(user).await.map_err(|e| match e.downcast::<meridian_store::BackendError>() {
        Ok(meridian_store::BackendError::NameConflict) => ApiError::Conflict("a user with that token or identity already exists".to_string()),
        Ok(other) => ApiError::StoreFailure(other.into()),
        Err(other) => ApiError::StoreFailure(other),
    })?;

    let mut view = UserView::from(created.clone());
    view.access_token = Some(created.token);
    Ok(view)
}

pub async fn get_user(store: &Store, caller: &AuthUser, id: Uuid) -> ApiResult<UserView> {
    if !caller.0.admin && !caller.is_self(id) {
        return Err(ApiError::Forbidden);
    }
    let user = store.get_user(id).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    Ok(UserView::from(user))
}

pub async fn update_user(store: &Store, caller: &AuthUser, id: Uuid, meta: UpdateUserMetadata) -> ApiResult<()> {
    if !caller.0.admin && !caller.is_self(id) {
        return Err(ApiError::Forbidden);
    }
    if meta.admin.is_some() {
        caller.require_admin()?;
    }

    let patch = UserPatch {
        name: meta.name,
        email: meta.email,
        phone: meta.phone,
        institution: meta.institution,
        admin: meta.admin,
    };
    store.update_user(id, patch).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    Ok(())
}

pub async fn delete_user(store: &Store, caller: &AuthUser, id: Uuid) -> ApiResult<()> {
    if !caller.0.admin && !caller.is_self(id) {
        return Err(ApiError::Forbidden);
    }
    if !store.delete_user(id).await.map_err(ApiError::StoreFailure)? {
        return Err(ApiError::NotFound);
    }
    Ok(())
}

pub async fn list_users(store: &Store, caller: &AuthUser) -> ApiResult<Vec<meridian_store::entities::Summary>> {
    caller.require_admin()?;
    store.list_users().await.map_err(ApiError::StoreFailure)
}

pub async fn list_user_groups(store: &Store, caller: &AuthUser, user: Uuid) -> ApiResult<Vec<Uuid>> {
    let _ = caller;
    store.list_user_groups(user).await.map_err(ApiError::StoreFailure)
}

pub async fn add_user_to_group(store: &Store, caller: &AuthUser, group: Uuid, user: Uuid) -> ApiResult<()> {
    caller.may_act_on_group(store, group).await?;
    store.add_group_member(group, user).await.map_err(ApiError::StoreFailure)
}

pub async fn find_user_by_globus_id(store: &Store, caller: &AuthUser, globus_id: &str) -> ApiResult<UserView> {
    caller.require_admin()?;
    let user = store
        .get_user_by_external_id(globus_id)
        .await
        .map_err(ApiError::StoreFailure)?
        .ok_or(ApiError::NotFound)?;
    Ok(UserView::from(user))
}
