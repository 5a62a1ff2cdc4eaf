//! State transitions for the two toggle-style relations: likes on posts and
//! follow edges between users.
//!
//! Both relations are flipped by a single call rather than separate add and
//! remove verbs. The store applies the transition while it holds the entity
//! (post row, or the pair of user rows) exclusively, so the set and anything
//! derived from it move together.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
}

impl Toggle {
    /// The transition taken from the current membership.
    pub fn from_membership(was_member: bool) -> Self {
        if was_member {
            Toggle::Removed
        } else {
            Toggle::Added
        }
    }

    /// Membership after the transition.
    pub fn is_member(self) -> bool {
        matches!(self, Toggle::Added)
    }

    pub fn delta(self) -> i64 {
        match self {
            Toggle::Added => 1,
            Toggle::Removed => -1,
        }
    }
}

/// Flips `id` in `members`. Removal drops every occurrence so the set
/// never holds an id twice.
pub fn toggle_member(members: &mut Vec<Uuid>, id: Uuid) -> Toggle {
    let toggle = Toggle::from_membership(members.contains(&id));
    match toggle {
        Toggle::Removed => members.retain(|m| *m != id),
        Toggle::Added => members.push(id),
    }
    toggle
}

/// Applies a toggle to a denormalized counter, floored at zero.
pub fn apply_delta(count: i64, toggle: Toggle) -> i64 {
    (count + toggle.delta()).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_adds_then_removes() {
        let id = Uuid::new_v4();
        let mut members = Vec::new();

        assert_eq!(toggle_member(&mut members, id), Toggle::Added);
        assert_eq!(members, vec![id]);

        assert_eq!(toggle_member(&mut members, id), Toggle::Removed);
        assert!(members.is_empty());
    }

    #[test]
    fn removal_clears_duplicates() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut members = vec![id, other, id];

        assert_eq!(toggle_member(&mut members, id), Toggle::Removed);
        assert_eq!(members, vec![other]);
    }

    #[test]
    fn membership_and_delta_agree() {
        assert!(Toggle::from_membership(false).is_member());
        assert_eq!(Toggle::from_membership(false).delta(), 1);
        assert!(!Toggle::from_membership(true).is_member());
        assert_eq!(Toggle::from_membership(true).delta(), -1);
    }

    #[test]
    fn counter_never_goes_negative() {
        assert_eq!(apply_delta(0, Toggle::Removed), 0);
        assert_eq!(apply_delta(1, Toggle::Removed), 0);
        assert_eq!(apply_delta(4, Toggle::Added), 5);
    }
}
