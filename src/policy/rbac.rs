//! In-memory role-based evaluator.
//!
//! Two kinds of facts:
//!
//! - **Rules** `(subject, object, action)`: the subject may perform the
//!   action on objects matching the pattern (see [`key_match`]). An action
//!   of `*` covers every action.
//! - **Groupings** `(user, role)`: the user holds every rule of the role.
//!   Roles may hold roles; the closure is computed per evaluation.
//!
//! Facts can be loaded from CSV text in the usual policy-file layout:
//!
//! ```text
//! p, alice, /dataset1/*, GET
//! p, dataset1_admin, /dataset1/*, *
//! g, cathy, dataset1_admin
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use super::PolicyEvaluator;
use super::pattern::key_match;
use crate::error::Error;

/// Action wildcard in rules.
const ANY_ACTION: &str = "*";

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct Rule {
    subject: String,
    object: String,
    action: String,
}

impl Rule {
    fn new(subject: &str, object: &str, action: &str) -> Self {
        Self { subject: subject.to_owned(), object: object.to_owned(), action: action.to_owned() }
    }

    fn covers(&self, object: &str, action: &str) -> bool {
        (self.action == ANY_ACTION || self.action == action) && key_match(object, &self.object)
    }
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<Rule>,
    // user -> directly held roles
    roles: HashMap<String, BTreeSet<String>>,
}

impl State {
    /// `subject` plus every role reachable from it. Cycles are harmless.
    fn closure(&self, subject: &str) -> HashSet<String> {
        let mut seen = HashSet::from([subject.to_owned()]);
        let mut queue = vec![subject.to_owned()];
        while let Some(next) = queue.pop() {
            for role in self.roles.get(&next).into_iter().flatten() {
                if seen.insert(role.clone()) {
                    queue.push(role.clone());
                }
            }
        }
        seen
    }
}

/// Rules and role groupings behind a read-write lock.
///
/// Evaluations take the read lock, so they run concurrently and always see
/// the latest committed change. Nothing is cached between evaluations.
#[derive(Debug, Default)]
pub struct RbacPolicy {
    state: RwLock<State>,
}

impl RbacPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `p, subject, object, action` and `g, user, role` lines.
    ///
    /// Blank lines and lines starting with `#` are skipped. Fields are
    /// comma-separated and trimmed.
    pub fn from_csv(text: &str) -> Result<Self, Error> {
        let mut state = State::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let parse_err = |reason: &str| Error::PolicyParse { line: idx + 1, reason: reason.to_owned() };
            if fields.iter().any(|f| f.is_empty()) {
                return Err(parse_err("empty field"));
            }
            match fields.as_slice() {
                ["p", subject, object, action] => {
                    let rule = Rule::new(subject, object, action);
                    if !state.rules.contains(&rule) {
                        state.rules.push(rule);
                    }
                }
                ["g", user, role] => {
                    state.roles.entry((*user).to_owned()).or_default().insert((*role).to_owned());
                }
                ["p", ..] => return Err(parse_err("expected `p, subject, object, action`")),
                ["g", ..] => return Err(parse_err("expected `g, user, role`")),
                [kind, ..] => return Err(parse_err(&format!("unknown line type `{kind}`"))),
                [] => return Err(parse_err("empty line")),
            }
        }
        Ok(Self { state: RwLock::new(state) })
    }

    /// Adds a rule. Returns `false` if it was already present.
    pub fn add_policy(&self, subject: &str, object: &str, action: &str) -> Result<bool, Error> {
        let rule = Rule::new(subject, object, action);
        let mut state = self.write()?;
        if state.rules.contains(&rule) {
            return Ok(false);
        }
        state.rules.push(rule);
        Ok(true)
    }

    /// Removes a rule. Returns `false` if it was not present.
    pub fn remove_policy(&self, subject: &str, object: &str, action: &str) -> Result<bool, Error> {
        let rule = Rule::new(subject, object, action);
        let mut state = self.write()?;
        let before = state.rules.len();
        state.rules.retain(|r| *r != rule);
        Ok(state.rules.len() != before)
    }

    /// Grants `role` to `user`. Returns `false` if already granted.
    pub fn add_role_for_user(&self, user: &str, role: &str) -> Result<bool, Error> {
        Ok(self.write()?.roles.entry(user.to_owned()).or_default().insert(role.to_owned()))
    }

    /// Revokes `role` from `user`. Returns `false` if it was not granted.
    pub fn delete_role_for_user(&self, user: &str, role: &str) -> Result<bool, Error> {
        let mut state = self.write()?;
        let Some(roles) = state.roles.get_mut(user) else {
            return Ok(false);
        };
        let removed = roles.remove(role);
        if roles.is_empty() {
            state.roles.remove(user);
        }
        Ok(removed)
    }

    /// Revokes every role held directly by `user`. Returns `false` if there
    /// were none.
    pub fn delete_roles_for_user(&self, user: &str) -> Result<bool, Error> {
        Ok(self.write()?.roles.remove(user).is_some_and(|roles| !roles.is_empty()))
    }

    /// Roles granted directly to `user`, sorted.
    pub fn roles_for_user(&self, user: &str) -> Result<Vec<String>, Error> {
        let state = self.read()?;
        Ok(state.roles.get(user).map(|r| r.iter().cloned().collect()).unwrap_or_default())
    }

    /// Every role `user` holds, directly or through other roles, sorted.
    pub fn implicit_roles_for_user(&self, user: &str) -> Result<Vec<String>, Error> {
        let mut closure = self.read()?.closure(user);
        closure.remove(user);
        let mut roles: Vec<String> = closure.into_iter().collect();
        roles.sort();
        Ok(roles)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, Error> {
        self.state.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, Error> {
        self.state.write().map_err(poisoned)
    }
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Evaluation("policy store lock poisoned".to_owned())
}

impl PolicyEvaluator for RbacPolicy {
    fn evaluate(&self, subject: &str, object: &str, action: &str) -> Result<bool, Error> {
        let state = self.read()?;
        let subjects = state.closure(subject);
        let allowed = state
            .rules
            .iter()
            .any(|rule| subjects.contains(&rule.subject) && rule.covers(object, action));
        trace!(subject, object, action, allowed, "policy evaluated");
        Ok(allowed)
    }
}
