use strum_macros::{Display, EnumString};

/// Admin roles. Stored as kebab-case text in the admins table, carried as a
/// numeric id inside JWT claims.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    SuperAdmin = 1,
    Admin = 2,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::SuperAdmin),
            2 => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn db_names_round_trip() {
        assert_eq!(Role::SuperAdmin.to_string(), "super-admin");
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::from_str("super-admin").unwrap(), Role::SuperAdmin);
    }

    #[test]
    fn claim_ids_round_trip() {
        assert_eq!(Role::from_id(Role::Admin.id()), Some(Role::Admin));
        assert_eq!(Role::from_id(0), None);
    }
}
