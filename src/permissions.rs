use axum::http::Method;

use crate::auth::AuthUser;
use crate::error::ApiError;

/// Resource families addressed by the permission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    /// The alias-addressed profile of the acting account.
    OwnProfile,
    Categories,
    Genres,
    Titles,
    Reviews,
    Comments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Read,
    Create,
    Update,
    Delete,
}

impl Verb {
    /// The HTTP method reported when the verb is refused with 405.
    pub fn method(&self) -> Method {
        match self {
            Verb::Read => Method::GET,
            Verb::Create => Method::POST,
            Verb::Update => Method::PATCH,
            Verb::Delete => Method::DELETE,
        }
    }
}

/// Who may perform a verb on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Anyone,
    Authenticated,
    AdminOrSuperuser,
    AdminAndSuperuser,
    /// Authenticated at request level; author or moderator once the item is loaded.
    AuthorOrModerator,
}

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Unauthenticated,
    Forbidden,
    MethodNotAllowed,
}

use Access::*;
use Resource::*;
use Verb::*;

/// The permission table. A (resource, verb) pair without an entry is not allowed.
pub const POLICY: &[(Resource, Verb, Access)] = &[
    (Users, Read, AdminOrSuperuser),
    (Users, Create, AdminOrSuperuser),
    (Users, Update, AdminOrSuperuser),
    (Users, Delete, AdminAndSuperuser),
    (OwnProfile, Read, Authenticated),
    (OwnProfile, Update, Authenticated),
    (Categories, Read, Anyone),
    (Categories, Create, AdminOrSuperuser),
    (Categories, Delete, AdminOrSuperuser),
    (Genres, Read, Anyone),
    (Genres, Create, AdminOrSuperuser),
    (Genres, Delete, AdminOrSuperuser),
    (Titles, Read, Anyone),
    (Titles, Create, AdminOrSuperuser),
    (Titles, Update, AdminOrSuperuser),
    (Titles, Delete, AdminOrSuperuser),
    (Reviews, Read, Anyone),
    (Reviews, Create, Authenticated),
    (Reviews, Update, AuthorOrModerator),
    (Reviews, Delete, AuthorOrModerator),
    (Comments, Read, Anyone),
    (Comments, Create, Authenticated),
    (Comments, Update, AuthorOrModerator),
    (Comments, Delete, AuthorOrModerator),
];

pub fn access_for(resource: Resource, verb: Verb) -> Option<Access> {
    POLICY
        .iter()
        .find(|(r, v, _)| *r == resource && *v == verb)
        .map(|(_, _, access)| *access)
}

/// decide
///
/// Pure policy evaluation. `author` is the loaded item's author id; pass `None` for
/// the request-level phase, before the item is known.
pub fn decide(
    resource: Resource,
    verb: Verb,
    actor: Option<&AuthUser>,
    author: Option<i64>,
) -> Decision {
    let Some(access) = access_for(resource, verb) else {
        return Decision::MethodNotAllowed;
    };

    if access == Anyone {
        return Decision::Allow;
    }
    let Some(actor) = actor else {
        return Decision::Unauthenticated;
    };

    let allowed = match access {
        Anyone | Authenticated => true,
        AdminOrSuperuser => actor.is_admin_or_superuser(),
        AdminAndSuperuser => actor.capabilities().is_admin && actor.is_superuser,
        AuthorOrModerator => match author {
            None => true,
            Some(author_id) => author_id == actor.id || actor.capabilities().is_moderator,
        },
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Forbidden
    }
}

impl Decision {
    pub fn into_result(self, verb: Verb) -> Result<(), ApiError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Unauthenticated => Err(ApiError::unauthenticated()),
            Decision::Forbidden => Err(ApiError::forbidden()),
            Decision::MethodNotAllowed => Err(ApiError::MethodNotAllowed(verb.method())),
        }
    }
}

/// Request-level check, run before any item is loaded.
pub fn authorize(resource: Resource, verb: Verb, actor: Option<&AuthUser>) -> Result<(), ApiError> {
    decide(resource, verb, actor, None).into_result(verb)
}

/// Object-level check against a loaded item's author.
pub fn authorize_object(
    resource: Resource,
    verb: Verb,
    actor: Option<&AuthUser>,
    author_id: i64,
) -> Result<(), ApiError> {
    decide(resource, verb, actor, Some(author_id)).into_result(verb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn actor(id: i64, role: Role, is_superuser: bool) -> AuthUser {
        AuthUser {
            id,
            username: format!("u{id}"),
            role,
            is_superuser,
        }
    }

    #[test]
    fn test_missing_entry_is_method_not_allowed_even_for_anonymous() {
        assert_eq!(decide(Categories, Update, None, None), Decision::MethodNotAllowed);
        assert_eq!(decide(OwnProfile, Delete, None, None), Decision::MethodNotAllowed);
        assert_eq!(decide(OwnProfile, Create, None, None), Decision::MethodNotAllowed);
    }

    #[test]
    fn test_user_delete_requires_admin_and_superuser() {
        let admin = actor(1, Role::Admin, false);
        let super_user = actor(2, Role::User, true);
        let super_admin = actor(3, Role::Admin, true);
        assert_eq!(decide(Users, Delete, Some(&admin), None), Decision::Forbidden);
        assert_eq!(decide(Users, Delete, Some(&super_user), None), Decision::Forbidden);
        assert_eq!(decide(Users, Delete, Some(&super_admin), None), Decision::Allow);
        // Other user verbs accept either.
        assert_eq!(decide(Users, Read, Some(&super_user), None), Decision::Allow);
        assert_eq!(decide(Users, Update, Some(&admin), None), Decision::Allow);
    }

    #[test]
    fn test_author_or_moderator_two_phases() {
        let author = actor(1, Role::User, false);
        let other = actor(2, Role::User, false);
        let moderator = actor(3, Role::Moderator, false);
        let admin = actor(4, Role::Admin, false);

        assert_eq!(decide(Reviews, Update, None, None), Decision::Unauthenticated);
        assert_eq!(decide(Reviews, Update, Some(&other), None), Decision::Allow);

        assert_eq!(decide(Reviews, Update, Some(&author), Some(1)), Decision::Allow);
        assert_eq!(decide(Reviews, Delete, Some(&other), Some(1)), Decision::Forbidden);
        assert_eq!(decide(Comments, Delete, Some(&moderator), Some(1)), Decision::Allow);
        assert_eq!(decide(Comments, Update, Some(&admin), Some(1)), Decision::Forbidden);
    }

    #[test]
    fn test_table_is_deterministic_for_every_role() {
        let resources = [Users, OwnProfile, Categories, Genres, Titles, Reviews, Comments];
        let verbs = [Read, Create, Update, Delete];
        for role in Role::ALL {
            for superuser in [false, true] {
                let a = actor(7, role, superuser);
                for r in resources {
                    for v in verbs {
                        let first = decide(r, v, Some(&a), Some(7));
                        assert_eq!(first, decide(r, v, Some(&a), Some(7)));
                        if access_for(r, v).is_none() {
                            assert_eq!(first, Decision::MethodNotAllowed);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_catalog_writes_need_admin_or_superuser() {
        let user = actor(1, Role::User, false);
        let moderator = actor(2, Role::Moderator, false);
        let superuser = actor(3, Role::User, true);
        assert_eq!(decide(Titles, Create, None, None), Decision::Unauthenticated);
        assert_eq!(decide(Titles, Create, Some(&user), None), Decision::Forbidden);
        assert_eq!(decide(Genres, Delete, Some(&moderator), None), Decision::Forbidden);
        assert_eq!(decide(Categories, Create, Some(&superuser), None), Decision::Allow);
        assert_eq!(decide(Titles, Read, None, None), Decision::Allow);
    }
}
