//! Authorship roles, completion kinds, and the role-constraint algebra.
//!
//! Every prompt component carries a [`RoleConstraint`] in its context. When
//! components combine, constraints merge through a small three-case set
//! algebra; conversion later resolves the merged constraint to the unique
//! role of the requested completion kind.

use serde::{Deserialize, Serialize};

use crate::error::{PromptError, Result};

/// The shape of the request a prompt is ultimately converted into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    /// Single-body text completion ("prefix" style).
    Text,
    /// Role-tagged chat completion.
    Chat,
}

impl std::fmt::Display for CompletionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Chat => write!(f, "chat"),
        }
    }
}

/// Message authorship role.
///
/// `Prefix` is the single synthetic role of the text-completion family; the
/// remaining four roles form the chat family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Synthetic role for the body of a text completion.
    Prefix,
    System,
    User,
    Assistant,
    /// Function/tool results reported back to the model.
    Tool,
}

impl Role {
    const ALL: [Role; 5] = [
        Role::Prefix,
        Role::System,
        Role::User,
        Role::Assistant,
        Role::Tool,
    ];

    /// The completion family this role belongs to.
    pub const fn completion_kind(self) -> CompletionKind {
        match self {
            Role::Prefix => CompletionKind::Text,
            _ => CompletionKind::Chat,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Role::Prefix => 1 << 0,
            Role::System => 1 << 1,
            Role::User => 1 << 2,
            Role::Assistant => 1 << 3,
            Role::Tool => 1 << 4,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prefix => write!(f, "prefix"),
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A set of roles, backed by a small bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<Role>", from = "Vec<Role>")]
pub struct RoleSet(u8);

impl RoleSet {
    /// The empty set.
    pub const EMPTY: RoleSet = RoleSet(0);

    /// Every role of every family.
    pub const ALL: RoleSet = RoleSet(0b1_1111);

    /// Build a set from individual roles.
    pub fn of(roles: impl IntoIterator<Item = Role>) -> Self {
        roles
            .into_iter()
            .fold(Self::EMPTY, |set, role| set.with(role))
    }

    /// All roles belonging to the given completion family.
    pub fn family(kind: CompletionKind) -> Self {
        Self::of(
            Role::ALL
                .into_iter()
                .filter(|role| role.completion_kind() == kind),
        )
    }

    pub const fn with(self, role: Role) -> Self {
        Self(self.0 | role.bit())
    }

    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate the member roles in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |role| self.contains(*role))
    }

    /// The single member, when the set is a singleton.
    pub fn sole(self) -> Option<Role> {
        if self.len() == 1 { self.iter().next() } else { None }
    }
}

impl From<RoleSet> for Vec<Role> {
    fn from(set: RoleSet) -> Self {
        set.iter().collect()
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(roles: Vec<Role>) -> Self {
        Self::of(roles)
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self::of(iter)
    }
}

/// Which authorship roles are currently acceptable for a segment or a whole
/// composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RoleConstraint {
    /// Every role except the listed ones is acceptable.
    Disallowed { roles: RoleSet },
    /// Only the listed roles are acceptable.
    Allowed { roles: RoleSet },
    /// Exactly one role is fixed.
    Selected { role: Role },
}

impl Default for RoleConstraint {
    fn default() -> Self {
        Self::any()
    }
}

impl std::fmt::Display for RoleConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disallowed { roles } => {
                write!(f, "disallowed(")?;
                for (i, role) in roles.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{role}")?;
                }
                write!(f, ")")
            }
            Self::Allowed { roles } => {
                write!(f, "allowed(")?;
                for (i, role) in roles.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{role}")?;
                }
                write!(f, ")")
            }
            Self::Selected { role } => write!(f, "selected({role})"),
        }
    }
}

impl RoleConstraint {
    /// The unconstrained value: nothing is disallowed.
    pub const fn any() -> Self {
        Self::Disallowed {
            roles: RoleSet::EMPTY,
        }
    }

    /// Fix a single role.
    pub const fn selected(role: Role) -> Self {
        Self::Selected { role }
    }

    /// Restrict to the listed roles.
    pub fn allowed(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::Allowed {
            roles: RoleSet::of(roles),
        }
    }

    /// Exclude the listed roles.
    pub fn disallowed(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::Disallowed {
            roles: RoleSet::of(roles),
        }
    }

    /// True when this constraint still accepts every role.
    pub fn is_unconstrained(&self) -> bool {
        matches!(self, Self::Disallowed { roles } if roles.is_empty())
    }

    /// The explicitly fixed role, if any.
    pub const fn selection(&self) -> Option<Role> {
        match self {
            Self::Selected { role } => Some(*role),
            _ => None,
        }
    }

    /// The set of roles this constraint accepts.
    pub fn acceptable(&self) -> RoleSet {
        match self {
            Self::Disallowed { roles } => RoleSet::ALL.difference(*roles),
            Self::Allowed { roles } => *roles,
            Self::Selected { role } => RoleSet::of([*role]),
        }
    }

    /// The completion kinds reachable from the acceptable role set.
    pub fn completion_kinds(&self) -> Vec<CompletionKind> {
        let acceptable = self.acceptable();
        [CompletionKind::Text, CompletionKind::Chat]
            .into_iter()
            .filter(|kind| !acceptable.intersection(RoleSet::family(*kind)).is_empty())
            .collect()
    }

    /// Merge two constraints.
    ///
    /// The operation is symmetric and must never produce an empty acceptable
    /// set; an `Allowed` result that collapses to one element self-promotes
    /// to `Selected`.
    pub fn merge(self, other: Self) -> Result<Self> {
        use RoleConstraint::*;

        let conflict = || PromptError::UnsatisfiableConstraint {
            left: self.to_string(),
            right: other.to_string(),
        };

        let merged = match (self, other) {
            (Disallowed { roles: a }, Disallowed { roles: b }) => {
                let union = a.union(b);
                if union == RoleSet::ALL {
                    return Err(conflict());
                }
                Disallowed { roles: union }
            }
            (Disallowed { roles: out }, Allowed { roles: allowed })
            | (Allowed { roles: allowed }, Disallowed { roles: out }) => {
                let remaining = allowed.difference(out);
                if remaining.is_empty() {
                    return Err(conflict());
                }
                Self::normalize_allowed(remaining)
            }
            (Allowed { roles: a }, Allowed { roles: b }) => {
                let shared = a.intersection(b);
                if shared.is_empty() {
                    return Err(conflict());
                }
                Self::normalize_allowed(shared)
            }
            (Disallowed { roles: out }, Selected { role })
            | (Selected { role }, Disallowed { roles: out }) => {
                if out.contains(role) {
                    return Err(conflict());
                }
                Selected { role }
            }
            (Allowed { roles }, Selected { role }) | (Selected { role }, Allowed { roles }) => {
                if !roles.contains(role) {
                    return Err(conflict());
                }
                Selected { role }
            }
            (Selected { role: a }, Selected { role: b }) => {
                if a != b {
                    return Err(conflict());
                }
                Selected { role: a }
            }
        };
        Ok(merged)
    }

    fn normalize_allowed(roles: RoleSet) -> Self {
        match roles.sole() {
            Some(role) => Self::Selected { role },
            None => Self::Allowed { roles },
        }
    }

    /// Pick the unique acceptable role of the requested completion kind.
    pub fn resolve(&self, kind: CompletionKind) -> Result<Role> {
        let candidates = self.acceptable().intersection(RoleSet::family(kind));
        match candidates.len() {
            0 => Err(PromptError::NoClearRoleSelection(kind)),
            1 => Ok(candidates.iter().next().expect("singleton set")),
            _ => Err(PromptError::UnsupportedCompletionKind(kind)),
        }
    }
}
