//! Axis VAPIX transport
//! Account list parsing for `pwdgrp.cgi?action=get` replies

use log::debug;
use serde::{ Deserialize, Serialize };
use std::fmt;

/// Characters the device may wrap or pad user lists with
const STRIPPED: &[char] = &[
    '&', '/', '\\', '#', '+', '(', ')', '$', '~', '%', '.', '\'', '"', ':', '*', '?', '<', '>', '{', '}',
];

const SYSTEM_ACCOUNT: &str = "root";

/// Ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Privilege {
    Viewer,
    Operator,
    Admin,
    System,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Privilege::Viewer => "Viewer",
            Privilege::Operator => "Operator",
            Privilege::Admin => "Admin",
            Privilege::System => "System",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub privileges: Privilege,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountList {
    pub accounts: Vec<Account>,
    /// Users listed in `digusers` that belong to no privilege group
    pub dropped: usize,
}

#[derive(Default)]
struct Groups {
    users: Vec<String>,
    admin: Vec<String>,
    operator: Vec<String>,
    viewer: Vec<String>,
}

impl Groups {
    fn privilege_of(&self, user: &str) -> Option<Privilege> {
        let member = |group: &[String]| group.iter().any(|name| name == user);
        if member(&self.admin) {
            Some(Privilege::Admin)
        } else if member(&self.operator) {
            Some(Privilege::Operator)
        } else if member(&self.viewer) {
            Some(Privilege::Viewer)
        } else {
            None
        }
    }
}

fn split_users(value: &str) -> Vec<String> {
    value
        .replace(STRIPPED, "")
        .split(',')
        .map(|user| user.trim().to_string())
        .filter(|user| !user.is_empty())
        .collect()
}

/// Parse the `group="user1,user2"` rows of a password group listing.
///
/// `root` is always reported first with [`Privilege::System`]. Every other
/// user takes the highest group it appears in.
pub fn parse_accounts(text: &str) -> AccountList {
    let mut groups = Groups::default();

    for line in text.lines() {
        let line = line.trim();
        let mut parts = line.split('=');
        let (Some(group), Some(users), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let users = split_users(users);
        match group.trim() {
            "digusers" => groups.users = users,
            "admin" => groups.admin = users,
            "operator" => groups.operator = users,
            "viewer" => groups.viewer = users,
            _ => {}
        }
    }

    let mut list = AccountList {
        accounts: vec![Account { name: SYSTEM_ACCOUNT.to_string(), privileges: Privilege::System }],
        dropped: 0,
    };

    for user in groups.users.iter().filter(|user| user.as_str() != SYSTEM_ACCOUNT) {
        match groups.privilege_of(user) {
            Some(privileges) => list.accounts.push(Account { name: user.clone(), privileges }),
            None => {
                debug!("Account {} has no privilege group", user);
                list.dropped += 1;
            }
        }
    }

    list
}
