//! Access-control provider.
//!
//! The core never decides visibility itself; it asks an [`AccessControl`]
//! implementation. The provided methods implement the common sharing
//! document convention:
//!
//! ```json
//! {"owner": "<user id>", "public": "rw------",
//!  "users": {"<user id>": "r-------"}, "userGroups": {"<group id>": "rw------"}}
//! ```
//!
//! Access strings are matched against patterns such as `r%` (metadata
//! read) or `__r%` (data read) with `LIKE` semantics.

use crate::ir::{Expr, Function};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capabilities of the caller on one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessSummary {
    pub manage: bool,
    pub externalize: bool,
    pub write: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
}

impl AccessSummary {
    pub fn full() -> Self {
        Self {
            manage: true,
            externalize: true,
            write: true,
            read: true,
            update: true,
            delete: true,
        }
    }

    pub fn to_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Decides what the current caller may see.
pub trait AccessControl: Send + Sync {
    fn is_superuser(&self) -> bool;

    fn current_user_id(&self) -> &str;

    fn can_read_type(&self, type_name: &str) -> bool;

    /// Field-level visibility of `path` on `type_name`
    fn can_read_field(&self, type_name: &str, path: &str) -> bool;

    /// Object-level visibility, used for owner-scoped listing
    fn can_read_object(&self, type_name: &str, id: &str) -> bool;

    fn group_ids_of(&self, user_id: &str) -> Vec<String>;

    /// Whether the caller may filter by another user's access
    fn can_filter_by_users_access(&self, user_id: &str) -> bool;

    /// Capabilities of the caller given an object's sharing document.
    fn access_summary(&self, _type_name: &str, sharing: &Value) -> AccessSummary {
        if self.is_superuser() {
            return AccessSummary::full();
        }
        let user = self.current_user_id();
        let groups = self.group_ids_of(user);
        summarize_sharing(sharing, user, &groups)
    }

    /// Predicate over the sharing document `sharing` that holds when
    /// `user_id` (or one of `group_ids`) has access matching `pattern`.
    fn sharing_predicate(
        &self,
        sharing: Expr,
        pattern: &str,
        user_id: &str,
        group_ids: &[String],
    ) -> Expr {
        json_sharing_predicate(sharing, pattern, user_id, group_ids)
    }
}

fn extract(document: &Expr, path: String) -> Expr {
    Expr::call(Function::JsonExtract, vec![document.clone(), Expr::text(path)])
}

/// Sharing predicate over a JSON sharing document.
pub fn json_sharing_predicate(
    sharing: Expr,
    pattern: &str,
    user_id: &str,
    group_ids: &[String],
) -> Expr {
    let mut alternatives = vec![
        extract(&sharing, "$.owner".to_string()).equals(Expr::text(user_id)),
        extract(&sharing, "$.public".to_string()).like(Expr::text(pattern), false),
        extract(&sharing, format!("$.users.\"{}\"", user_id)).like(Expr::text(pattern), false),
    ];
    for group in group_ids {
        alternatives.push(
            extract(&sharing, format!("$.userGroups.\"{}\"", group))
                .like(Expr::text(pattern), false),
        );
    }
    Expr::Or(alternatives)
}

/// Whether an access string like `rw------` matches a `LIKE` pattern built
/// from `_`, `%` and literal characters.
pub fn access_matches(access: &str, pattern: &str) -> bool {
    fn matches(access: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => access.is_empty(),
            Some(('%', rest)) => (0..=access.len()).any(|i| matches(&access[i..], rest)),
            Some((p, rest)) => match access.split_first() {
                Some((a, tail)) if *p == '_' || p == a => matches(tail, rest),
                _ => false,
            },
        }
    }
    let access: Vec<char> = access.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    matches(&access, &pattern)
}

/// Access strings granted to a user by a sharing document
fn granted_access<'a>(sharing: &'a Value, user_id: &str, group_ids: &[String]) -> Vec<&'a str> {
    let mut granted = Vec::new();
    if let Some(public) = sharing.get("public").and_then(Value::as_str) {
        granted.push(public);
    }
    if let Some(access) = sharing
        .get("users")
        .and_then(|u| u.get(user_id))
        .and_then(Value::as_str)
    {
        granted.push(access);
    }
    if let Some(groups) = sharing.get("userGroups") {
        for group in group_ids {
            if let Some(access) = groups.get(group.as_str()).and_then(Value::as_str) {
                granted.push(access);
            }
        }
    }
    granted
}

/// Capability summary of a user on an object with sharing document `sharing`.
pub fn summarize_sharing(sharing: &Value, user_id: &str, group_ids: &[String]) -> AccessSummary {
    let owner = sharing.get("owner").and_then(Value::as_str) == Some(user_id);
    if owner {
        return AccessSummary::full();
    }
    let granted = granted_access(sharing, user_id, group_ids);
    let read = granted.iter().any(|a| access_matches(a, "r%"));
    let write = granted.iter().any(|a| access_matches(a, "_w%"));
    AccessSummary {
        manage: write,
        externalize: false,
        write,
        read,
        update: write,
        delete: write,
    }
}

/// Unrestricted access for trusted internal callers.
#[derive(Debug, Clone)]
pub struct SuperuserAccess {
    user_id: String,
}

impl SuperuserAccess {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl Default for SuperuserAccess {
    fn default() -> Self {
        Self::new("system")
    }
}

impl AccessControl for SuperuserAccess {
    fn is_superuser(&self) -> bool {
        true
    }

    fn current_user_id(&self) -> &str {
        &self.user_id
    }

    fn can_read_type(&self, _type_name: &str) -> bool {
        true
    }

    fn can_read_field(&self, _type_name: &str, _path: &str) -> bool {
        true
    }

    fn can_read_object(&self, _type_name: &str, _id: &str) -> bool {
        true
    }

    fn group_ids_of(&self, _user_id: &str) -> Vec<String> {
        Vec::new()
    }

    fn can_filter_by_users_access(&self, _user_id: &str) -> bool {
        true
    }
}
