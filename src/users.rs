//! The user/group store: a CSV text resource living at inode 1
//! (`/users.txt`), plus authentication and the administrative commands that
//! rewrite it.
//!
//! Lines are either `gid,G,groupname` or `uid,U,groupname,username,password`;
//! a first field of `0` marks a deleted entry.

use crate::context::{Context, Session};
use crate::error::{Error, Result};
use crate::fs::{file, FsVolume};

/// The content of `/users.txt` right after formatting.
pub const BOOTSTRAP: &str = "1,G,root\n1,U,root,root,123\n";

/// The inode holding `/users.txt`.
pub const USERS_INODE: i32 = 1;

/// One parsed line of the users file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Entry {
    Group {
        /// Group id; `0` once deleted.
        id: i32,
        name: String,
    },
    User {
        /// The owning group's id; `0` once deleted.
        id: i32,
        group: String,
        name: String,
        password: String,
    },
}

impl Entry {
    fn to_line(&self) -> String {
        match self {
            Self::Group { id, name } => format!("{id},G,{name}"),
            Self::User {
                id,
                group,
                name,
                password,
            } => format!("{id},U,{group},{name},{password}"),
        }
    }
}

/// Parses the users file, skipping malformed lines.
pub fn parse(text: &str) -> Vec<Entry> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let id = fields.first()?.parse().ok()?;
            match (fields.get(1).copied(), fields.len()) {
                (Some("G"), 3) => Some(Entry::Group {
                    id,
                    name: fields[2].to_owned(),
                }),
                (Some("U"), 5) => Some(Entry::User {
                    id,
                    group: fields[2].to_owned(),
                    name: fields[3].to_owned(),
                    password: fields[4].to_owned(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Serializes entries back into the newline-terminated CSV stream.
pub fn serialize(entries: &[Entry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.to_line());
        out.push('\n');
    }
    out
}

/// The next id to hand out: the maximum first field plus one.
pub fn next_id(entries: &[Entry]) -> i32 {
    entries
        .iter()
        .map(|e| match e {
            Entry::Group { id, .. } | Entry::User { id, .. } => *id,
        })
        .max()
        .unwrap_or(0)
        + 1
}

fn live_group<'e>(entries: &'e [Entry], name: &str) -> Option<(usize, i32)> {
    entries.iter().enumerate().find_map(|(i, e)| match e {
        Entry::Group { id, name: n } if *id != 0 && n == name => Some((i, *id)),
        _ => None,
    })
}

fn live_user(entries: &[Entry], name: &str) -> Option<usize> {
    entries.iter().position(|e| {
        matches!(e, Entry::User { id, name: n, .. } if *id != 0 && n == name)
    })
}

/// Appends a new group after the last group's cluster.
pub fn add_group(entries: &mut Vec<Entry>, name: &str) -> Result<()> {
    if live_group(entries, name).is_some() {
        return Err(Error::AlreadyExists(format!("group `{name}` already exists")));
    }
    let id = next_id(entries);
    entries.push(Entry::Group {
        id,
        name: name.to_owned(),
    });
    Ok(())
}

/// Inserts a new user right below its group's header line.
pub fn add_user(entries: &mut Vec<Entry>, name: &str, password: &str, group: &str) -> Result<()> {
    if live_user(entries, name).is_some() {
        return Err(Error::AlreadyExists(format!("user `{name}` already exists")));
    }
    let (position, gid) = live_group(entries, group)
        .ok_or_else(|| Error::NotFound(format!("group `{group}` does not exist")))?;
    entries.insert(
        position + 1,
        Entry::User {
            id: gid,
            group: group.to_owned(),
            name: name.to_owned(),
            password: password.to_owned(),
        },
    );
    Ok(())
}

/// Marks a group deleted and cascades over its member users.
pub fn remove_group(entries: &mut [Entry], name: &str) -> Result<()> {
    let (position, _) = live_group(entries, name)
        .ok_or_else(|| Error::NotFound(format!("group `{name}` does not exist")))?;
    if let Entry::Group { id, .. } = &mut entries[position] {
        *id = 0;
    }
    for entry in entries.iter_mut() {
        if let Entry::User { id, group, .. } = entry {
            if group == name {
                *id = 0;
            }
        }
    }
    Ok(())
}

/// Marks a user deleted.
pub fn remove_user(entries: &mut [Entry], name: &str) -> Result<()> {
    let position = live_user(entries, name)
        .ok_or_else(|| Error::NotFound(format!("user `{name}` does not exist")))?;
    if let Entry::User { id, .. } = &mut entries[position] {
        *id = 0;
    }
    Ok(())
}

/// Reorders the file so every user line sits below its group's header.
/// Users whose group no longer appears keep their relative order at the end.
pub fn regroup(entries: Vec<Entry>) -> Vec<Entry> {
    let mut out = Vec::with_capacity(entries.len());
    let mut users: Vec<Entry> = Vec::new();
    for entry in &entries {
        if matches!(entry, Entry::User { .. }) {
            users.push(entry.clone());
        }
    }
    for entry in &entries {
        if let Entry::Group { name, .. } = entry {
            out.push(entry.clone());
            let mut i = 0;
            while i < users.len() {
                let belongs = matches!(&users[i], Entry::User { group, .. } if group == name);
                if belongs {
                    out.push(users.remove(i));
                } else {
                    i += 1;
                }
            }
        }
    }
    out.extend(users);
    out
}

/// Moves a user to another group, keeping the id/group invariant: the user's
/// first field becomes the new group's gid. Returns `false` when the user
/// already belongs to the target group (a silent no-op).
pub fn change_group(entries: &mut Vec<Entry>, user: &str, new_group: &str) -> Result<bool> {
    let (_, gid) = live_group(entries, new_group)
        .ok_or_else(|| Error::NotFound(format!("group `{new_group}` does not exist")))?;
    let position = live_user(entries, user)
        .ok_or_else(|| Error::NotFound(format!("user `{user}` does not exist")))?;
    if let Entry::User { id, group, .. } = &mut entries[position] {
        if group == new_group {
            return Ok(false);
        }
        *id = gid;
        *group = new_group.to_owned();
    }
    let regrouped = regroup(std::mem::take(entries));
    *entries = regrouped;
    Ok(true)
}

/// Reads the full users file through inode 1.
pub fn read_users(vol: &mut FsVolume) -> Result<String> {
    file::read_file(vol, USERS_INODE)
}

/// Rewrites the users file in place through inode 1.
pub fn write_users(vol: &mut FsVolume, text: &str) -> Result<()> {
    file::write_file_content(vol, USERS_INODE, text)
}

/// Requires the active session to belong to `root`.
fn require_root(ctx: &Context) -> Result<()> {
    let session = ctx.session()?;
    if session.user != "root" {
        return Err(Error::Forbidden(format!(
            "`{}` is not allowed to manage users",
            session.user
        )));
    }
    Ok(())
}

/// Applies `op` to the parsed users file and writes the result back.
fn update_users<F>(ctx: &Context, op: F) -> Result<()>
where
    F: FnOnce(&mut Vec<Entry>) -> Result<()>,
{
    require_root(ctx)?;
    let mut vol = FsVolume::open_session(ctx)?;
    let mut entries = parse(&read_users(&mut vol)?);
    op(&mut entries)?;
    write_users(&mut vol, &serialize(&entries))?;
    vol.sync()?;
    Ok(())
}

/// `mkgrp`: creates a group.
pub fn mkgrp(ctx: &Context, name: &str) -> Result<String> {
    update_users(ctx, |entries| add_group(entries, name))?;
    Ok(format!("group `{name}` created\n"))
}

/// `rmgrp`: deletes a group and its members.
pub fn rmgrp(ctx: &Context, name: &str) -> Result<String> {
    update_users(ctx, |entries| remove_group(entries, name))?;
    Ok(format!("group `{name}` removed\n"))
}

/// `mkusr`: creates a user inside an existing group.
pub fn mkusr(ctx: &Context, user: &str, password: &str, group: &str) -> Result<String> {
    update_users(ctx, |entries| add_user(entries, user, password, group))?;
    Ok(format!("user `{user}` created in group `{group}`\n"))
}

/// `rmusr`: deletes a user.
pub fn rmusr(ctx: &Context, user: &str) -> Result<String> {
    update_users(ctx, |entries| remove_user(entries, user))?;
    Ok(format!("user `{user}` removed\n"))
}

/// `chgrp`: moves a user to another group.
pub fn chgrp(ctx: &Context, user: &str, group: &str) -> Result<String> {
    let mut moved = true;
    update_users(ctx, |entries| {
        moved = change_group(entries, user, group)?;
        Ok(())
    })?;
    if moved {
        Ok(format!("user `{user}` moved to group `{group}`\n"))
    } else {
        Ok(format!("user `{user}` already belongs to `{group}`\n"))
    }
}

/// `login`: authenticates against `/users.txt` of the partition mounted as
/// `id` and opens the session.
pub fn login(ctx: &mut Context, user: &str, password: &str, id: &str) -> Result<String> {
    if ctx.session.is_some() {
        return Err(Error::Forbidden(
            "a session is already open, log out first".into(),
        ));
    }
    let mut vol = FsVolume::open(&ctx.mounts, id)?;
    let entries = parse(&read_users(&mut vol)?);
    let found = entries.iter().find_map(|e| match e {
        Entry::User {
            id: uid,
            group,
            name,
            password: pass,
        } if *uid != 0 && name == user && pass == password => Some((*uid, group.clone())),
        _ => None,
    });
    let Some((uid, group)) = found else {
        return Err(Error::NotFound("wrong user name or password".into()));
    };
    ctx.session = Some(Session {
        user: user.to_owned(),
        group,
        uid,
        mount_id: id.to_owned(),
    });
    Ok(format!("welcome, {user}\n"))
}

/// `logout`: closes the active session.
pub fn logout(ctx: &mut Context) -> Result<String> {
    if ctx.session.take().is_none() {
        return Err(Error::Forbidden("no user is logged in".into()));
    }
    Ok("session closed\n".into())
}
