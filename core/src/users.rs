//! User account management on top of the document API.
//!
//! # Design
//! Pure composition: user accounts are ordinary documents in the `_users`
//! database whose ids carry a fixed `org.couchdb.user:` prefix. The wrapper
//! holds a mutable borrow of the client and forces the selected database to
//! `_users` at construction, so a caller cannot accidentally write user
//! documents into a data database.

use serde_json::{json, Value};

use crate::client::CouchClient;
use crate::error::Error;
use crate::types::{Body, Response};

const USER_ID_PREFIX: &str = "org.couchdb.user:";

/// Fields the server derives from `password`; they are stripped before a
/// password change so the server regenerates them.
const DERIVED_FIELDS: [&str; 4] = ["iterations", "derived_key", "password_scheme", "salt"];

/// User-account helpers over a [`CouchClient`].
#[derive(Debug)]
pub struct UserUtils<'a> {
    couch: &'a mut CouchClient,
}

impl<'a> UserUtils<'a> {
    /// Wrap `couch`, selecting the `_users` database on it.
    pub fn new(couch: &'a mut CouchClient) -> Self {
        couch.set_database("_users");
        Self { couch }
    }

    /// Create a user account. `name` defaults to `id` when not given; the
    /// server salts and encrypts `password`.
    pub fn create_user(
        &self,
        id: &str,
        password: &str,
        name: Option<&str>,
        roles: &[String],
    ) -> Result<Response, Error> {
        if id.is_empty() {
            return Err(Error::Validation("invalid user id".to_string()));
        }
        if password.is_empty() {
            return Err(Error::Validation("invalid user password".to_string()));
        }
        if matches!(name, Some("")) {
            return Err(Error::Validation("invalid user name".to_string()));
        }
        for (position, role) in roles.iter().enumerate() {
            if role.is_empty() {
                return Err(Error::Validation(format!(
                    "an invalid role was specified at position {position}"
                )));
            }
        }

        let name = name.unwrap_or(id);
        let id = format!("{USER_ID_PREFIX}{id}");

        let doc = json!({
            "_id": id,
            "type": "user",
            "name": name,
            "roles": roles,
            "password": password,
        });

        self.couch.put(&id, &doc)
    }

    /// Fetch a user document, returning just the response body. Set
    /// `has_prefix` when `id` already carries the account namespace.
    pub fn get_user(&self, id: &str, has_prefix: bool) -> Result<Body, Error> {
        let reference = if has_prefix {
            id.to_string()
        } else {
            format!("{USER_ID_PREFIX}{id}")
        };
        Ok(self.couch.get(&format!("/{reference}"))?.body)
    }

    /// Update the password on a fetched user document. The password-derived
    /// fields are stripped so the server regenerates them from the new
    /// password.
    pub fn change_password(&self, doc: &Value, new_password: &str) -> Result<Response, Error> {
        let id = doc
            .get("_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                Error::Validation("this does not look like a document: there is no _id".to_string())
            })?;

        if doc
            .get("_rev")
            .and_then(Value::as_str)
            .filter(|rev| !rev.is_empty())
            .is_none()
        {
            return Err(Error::Validation("this document does not have a _rev".to_string()));
        }

        if doc.get("type").and_then(Value::as_str) != Some("user") {
            return Err(Error::Validation(
                "this does not look like a user - change admin passwords via the server config"
                    .to_string(),
            ));
        }

        if new_password.is_empty() {
            return Err(Error::Validation("empty passwords are not allowed".to_string()));
        }

        let mut updated = doc.clone();
        if let Some(fields) = updated.as_object_mut() {
            for field in DERIVED_FIELDS {
                fields.remove(field);
            }
            fields.insert("password".to_string(), Value::String(new_password.to_string()));
        }

        self.couch.put(id, &updated)
    }

    /// Delete a user account: read the document for its current revision,
    /// then delete by id and revision.
    pub fn delete_user(&self, id: &str, has_prefix: bool) -> Result<Response, Error> {
        let doc = match self.get_user(id, has_prefix)? {
            Body::Json(doc) => doc,
            Body::Raw(_) => {
                return Err(Error::Validation(
                    "response decoding is disabled; the user document cannot be inspected"
                        .to_string(),
                ))
            }
        };

        let doc_id = doc
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("user document has no _id".to_string()))?;
        let rev = doc
            .get("_rev")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("user document has no _rev".to_string()))?;

        self.couch.delete(doc_id, rev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Validation failures below surface before any socket is opened, so a
    /// dead port is safe here.
    fn client() -> CouchClient {
        CouchClient::new("127.0.0.1", 1)
    }

    #[test]
    fn new_forces_the_users_database() {
        let mut c = client();
        c.set_database("somewhere_else");
        UserUtils::new(&mut c);
        assert_eq!(c.current_database(), Some("_users"));
    }

    #[test]
    fn create_user_rejects_empty_id_password_and_name() {
        let mut c = client();
        let users = UserUtils::new(&mut c);

        assert!(matches!(users.create_user("", "pw", None, &[]), Err(Error::Validation(_))));
        assert!(matches!(users.create_user("bob", "", None, &[]), Err(Error::Validation(_))));
        assert!(matches!(
            users.create_user("bob", "pw", Some(""), &[]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn create_user_rejects_empty_roles() {
        let mut c = client();
        let users = UserUtils::new(&mut c);

        let err = users
            .create_user("bob", "pw", None, &["admin".to_string(), String::new()])
            .unwrap_err();
        match err {
            Error::Validation(msg) => assert!(msg.contains("position 1")),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn change_password_requires_a_user_document() {
        let mut c = client();
        let users = UserUtils::new(&mut c);

        let no_id = json!({"type": "user", "_rev": "1-a"});
        assert!(matches!(users.change_password(&no_id, "pw"), Err(Error::Validation(_))));

        let no_rev = json!({"_id": "org.couchdb.user:bob", "type": "user"});
        assert!(matches!(users.change_password(&no_rev, "pw"), Err(Error::Validation(_))));

        let not_a_user = json!({"_id": "x", "_rev": "1-a", "type": "cat"});
        assert!(matches!(
            users.change_password(&not_a_user, "pw"),
            Err(Error::Validation(_))
        ));

        let fine = json!({"_id": "org.couchdb.user:bob", "_rev": "1-a", "type": "user"});
        assert!(matches!(users.change_password(&fine, ""), Err(Error::Validation(_))));
    }
}
