//! Line-oriented command shell for the virtual-disk filesystem.
//!
//! Runs either a script file passed on the command line or an interactive
//! prompt. Each line is a command of the form `cmd -flag=value ...`; lines
//! starting with `#` are comments. Errors are printed and execution
//! continues with the next line.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use vdisk::context::Context;
use vdisk::error::{Error, Result};
use vdisk::mbr::{Fit, TYPE_EXTENDED, TYPE_PRIMARY};
use vdisk::prompt::prompt;
use vdisk::superblock::FsKind;
use vdisk::{disk, fs as vfs, mkfs, report, users, util};

/// Parsed flags of one command line: `-key=value` pairs and bare switches.
#[derive(Default)]
struct Flags {
    values: HashMap<String, String>,
    switches: Vec<String>,
}

impl Flags {
    fn parse(tokens: &[String]) -> Result<Self> {
        let mut flags = Self::default();
        for token in tokens {
            let Some(body) = token.strip_prefix('-') else {
                return Err(Error::InvalidArgument(format!(
                    "expected a -flag, got `{token}`"
                )));
            };
            match body.split_once('=') {
                Some((key, value)) => {
                    flags
                        .values
                        .insert(key.to_ascii_lowercase(), value.to_owned());
                }
                None => flags.switches.push(body.to_ascii_lowercase()),
            }
        }
        Ok(flags)
    }

    fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.value(key)
            .ok_or_else(|| Error::InvalidArgument(format!("missing required flag -{key}")))
    }

    fn int(&self, key: &str) -> Result<Option<i64>> {
        self.value(key)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| Error::InvalidArgument(format!("-{key} must be an integer")))
            })
            .transpose()
    }

    fn has(&self, key: &str) -> bool {
        self.switches.iter().any(|s| s == key)
    }

    /// The `-file1`, `-file2`, ... series of `cat`, in positional order.
    fn numbered_files(&self) -> Vec<String> {
        let mut files: Vec<(u32, String)> = self
            .values
            .iter()
            .filter_map(|(k, v)| {
                let n = k.strip_prefix("file")?.parse().ok()?;
                Some((n, v.clone()))
            })
            .collect();
        files.sort_by_key(|(n, _)| *n);
        files.into_iter().map(|(_, v)| v).collect()
    }
}

/// Splits a command line into tokens, honoring double quotes inside values.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// The byte size from a `-size`/`-unit` flag pair.
fn size_in_bytes(flags: &Flags, unit_default: &str) -> Result<i64> {
    let size = flags
        .int("size")?
        .ok_or_else(|| Error::InvalidArgument("missing required flag -size".into()))?;
    if size <= 0 {
        return Err(Error::InvalidArgument("-size must be positive".into()));
    }
    util::to_bytes(size, flags.value("unit").unwrap_or(unit_default))
}

fn cmd_mkdisk(flags: &Flags) -> Result<String> {
    let path = PathBuf::from(flags.require("path")?);
    if path.extension().and_then(|e| e.to_str()) != Some("mia") {
        return Err(Error::InvalidArgument(
            "disk images take the .mia extension".into(),
        ));
    }
    let size = size_in_bytes(flags, "M")?;
    let fit = Fit::from_flag(flags.value("fit").unwrap_or("FF"))?;
    disk::create_disk(&path, size, fit)?;
    Ok(format!(
        "disk `{}` created ({})\n",
        path.display(),
        util::ByteSize(size as u64)
    ))
}

fn cmd_rmdisk(flags: &Flags, interactive: bool) -> Result<String> {
    let path = PathBuf::from(flags.require("path")?);
    if interactive {
        let question = format!("Remove disk `{}`? (y/N) ", path.display());
        let confirm = prompt(&question, false)
            .map(|s| s.eq_ignore_ascii_case("y"))
            .unwrap_or(false);
        if !confirm {
            return Ok("aborted\n".into());
        }
    }
    disk::remove_disk(&path)?;
    Ok(format!("disk `{}` removed\n", path.display()))
}

fn cmd_fdisk(flags: &Flags) -> Result<String> {
    let path = PathBuf::from(flags.require("path")?);
    let name = flags.require("name")?;

    if let Some(mode) = flags.value("delete") {
        let full = match mode.to_ascii_lowercase().as_str() {
            "fast" => false,
            "full" => true,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "-delete must be fast or full, got `{other}`"
                )))
            }
        };
        disk::delete_partition(&path, name, full)?;
        return Ok(format!("partition `{name}` deleted ({mode})\n"));
    }

    if let Some(add) = flags.int("add")? {
        if add == 0 {
            return Err(Error::InvalidArgument("-add must not be zero".into()));
        }
        let delta = util::to_bytes(add, flags.value("unit").unwrap_or("K"))?;
        disk::resize_partition(&path, name, delta)?;
        return Ok(format!("partition `{name}` resized by {delta} bytes\n"));
    }

    let size = size_in_bytes(flags, "K")?;
    let part_type = match flags
        .value("type")
        .unwrap_or("P")
        .to_ascii_uppercase()
        .as_str()
    {
        "P" => TYPE_PRIMARY,
        "E" => TYPE_EXTENDED,
        "L" => b'L',
        other => {
            return Err(Error::InvalidArgument(format!(
                "-type must be P, E or L, got `{other}`"
            )))
        }
    };
    // The disk-wide fit from mkdisk governs placement; a -fit here only
    // applies to logical partitions' EBR byte.
    if let Some(fit) = flags.value("fit") {
        Fit::from_flag(fit)?;
    }
    disk::create_partition(&path, size, part_type, name)?;
    Ok(format!("partition `{name}` created ({size} bytes)\n"))
}

fn cmd_mkfs(ctx: &Context, flags: &Flags, interactive: bool) -> Result<String> {
    let id = flags.require("id")?;
    if let Some(t) = flags.value("type") {
        if !t.eq_ignore_ascii_case("full") {
            return Err(Error::InvalidArgument("-type must be full".into()));
        }
    }
    let kind = FsKind::from_flag(flags.value("fs").unwrap_or("2fs"))?;
    if interactive {
        let (mut file, mbr, index) = ctx.mounts.open(id)?;
        if mkfs::is_formatted(&mut file, mbr.partitions[index].start as u64) {
            let confirm = prompt("The partition already holds a filesystem. Proceed anyway? (y/N) ", false)
                .map(|s| s.eq_ignore_ascii_case("y"))
                .unwrap_or(false);
            if !confirm {
                return Ok("aborted\n".into());
            }
        }
    }
    mkfs::format(&ctx.mounts, id, kind)
}

fn cmd_rep(ctx: &Context, flags: &Flags) -> Result<String> {
    let id = flags.require("id")?;
    let name = flags.require("name")?;
    let out_path = PathBuf::from(flags.require("path")?);
    let target = flags.value("path_file_ls");
    let content = report::report(ctx, id, name, target)?;
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&out_path, &content)?;
    Ok(format!("report `{name}` written to `{}`\n", out_path.display()))
}

fn cmd_login(ctx: &mut Context, flags: &Flags, interactive: bool) -> Result<String> {
    let user = flags.require("user")?.to_owned();
    let id = flags.require("id")?.to_owned();
    let pass = match flags.value("pass") {
        Some(p) => p.to_owned(),
        None if interactive => prompt("Password: ", true)
            .ok_or_else(|| Error::InvalidArgument("missing required flag -pass".into()))?,
        None => return Err(Error::InvalidArgument("missing required flag -pass".into())),
    };
    users::login(ctx, &user, &pass, &id)
}

fn print_help() -> String {
    "commands:\n\
     \x20 mkdisk -size=N [-unit=B|K|M] [-fit=BF|FF|WF] -path=FILE.mia\n\
     \x20 rmdisk -path=FILE.mia\n\
     \x20 fdisk  -size=N [-unit=B|K|M] -path=FILE.mia [-type=P|E|L] -name=NAME\n\
     \x20 fdisk  -path=FILE.mia -name=NAME -add=±N [-unit=...]\n\
     \x20 fdisk  -path=FILE.mia -name=NAME -delete=fast|full\n\
     \x20 mount  -path=FILE.mia -name=NAME      unmount -id=ID\n\
     \x20 mkfs   -id=ID [-type=full] [-fs=2fs|3fs]\n\
     \x20 login  -user=U -pass=P -id=ID         logout\n\
     \x20 mkgrp  -name=G      rmgrp -name=G     chgrp -user=U -grp=G\n\
     \x20 mkusr  -user=U -pass=P -grp=G         rmusr -user=U\n\
     \x20 mkdir  -path=P [-p]\n\
     \x20 mkfile -path=P [-r] [-size=N] [-cont=TEXT]\n\
     \x20 cat    -file1=P [-file2=P ...]\n\
     \x20 edit   -path=P -contenido=P\n\
     \x20 find   -path=P -name=GLOB             rename -path=P -name=NEW\n\
     \x20 remove -path=P                        lsblk -path=FILE.mia\n\
     \x20 rep    -id=ID -path=OUT -name=KIND [-path_file_ls=P]\n\
     \x20 help | clear | exit\n"
        .into()
}

/// Executes one command line and returns its output.
fn execute(ctx: &mut Context, line: &str, interactive: bool) -> Result<String> {
    let tokens = tokenize(line);
    let Some(cmd) = tokens.first() else {
        return Ok(String::new());
    };
    let flags = Flags::parse(&tokens[1..])?;
    match cmd.to_ascii_lowercase().as_str() {
        "mkdisk" => cmd_mkdisk(&flags),
        "rmdisk" => cmd_rmdisk(&flags, interactive),
        "fdisk" => cmd_fdisk(&flags),
        "lsblk" => disk::lsblk(Path::new(flags.require("path")?)),
        "mount" => {
            let path = PathBuf::from(flags.require("path")?);
            let id = ctx.mounts.mount(&path, flags.require("name")?)?;
            Ok(format!("mounted as `{id}`\n{}", ctx.mounts.list()))
        }
        "unmount" => {
            let id = flags.require("id")?;
            ctx.mounts.unmount(id)?;
            Ok(format!("`{id}` unmounted\n"))
        }
        "mkfs" => cmd_mkfs(ctx, &flags, interactive),
        "login" => cmd_login(ctx, &flags, interactive),
        "logout" => users::logout(ctx),
        "mkgrp" => users::mkgrp(ctx, flags.require("name")?),
        "rmgrp" => users::rmgrp(ctx, flags.require("name")?),
        "mkusr" => users::mkusr(
            ctx,
            flags.require("user")?,
            flags.require("pass")?,
            flags.require("grp")?,
        ),
        "rmusr" => users::rmusr(ctx, flags.require("user")?),
        "chgrp" => users::chgrp(ctx, flags.require("user")?, flags.require("grp")?),
        "mkdir" => vfs::dir::mkdir(ctx, flags.require("path")?, flags.has("p")),
        "mkfile" => vfs::file::mkfile(
            ctx,
            flags.require("path")?,
            flags.has("r"),
            flags.int("size")?.map(|s| s.max(0) as usize),
            flags.value("cont").map(str::to_owned),
        ),
        "cat" => {
            let files = flags.numbered_files();
            if files.is_empty() {
                return Err(Error::InvalidArgument("cat needs at least -file1".into()));
            }
            vfs::file::cat(ctx, &files)
        }
        "edit" => vfs::file::edit(ctx, flags.require("path")?, flags.require("contenido")?),
        "find" => vfs::find::find(ctx, flags.require("path")?, flags.require("name")?),
        "rename" => vfs::rename::rename(ctx, flags.require("path")?, flags.require("name")?),
        "remove" => vfs::remove::remove(ctx, flags.require("path")?),
        "rep" => cmd_rep(ctx, &flags),
        "help" => Ok(print_help()),
        "clear" => Ok("\x1b[2J\x1b[H".into()),
        other => Err(Error::InvalidArgument(format!("unknown command `{other}`"))),
    }
}

/// Runs every line of a script, printing outputs and errors as it goes.
fn run_script(ctx: &mut Context, text: &str) {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        println!("> {line}");
        match execute(ctx, line, false) {
            Ok(output) => print!("{output}"),
            Err(err) => eprintln!("error: {err}"),
        }
        let _ = std::io::stdout().flush();
    }
}

fn run_interactive(ctx: &mut Context) {
    while let Some(line) = prompt("vdisk> ", false) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") {
            break;
        }
        match execute(ctx, line, std::io::stdin().is_terminal()) {
            Ok(output) => print!("{output}"),
            Err(err) => eprintln!("error: {err}"),
        }
        let _ = std::io::stdout().flush();
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut ctx = Context::default();
    match args.first().map(String::as_str) {
        Some("-h" | "--help") => {
            print!("{}", print_help());
        }
        Some(script) => {
            let text = fs::read_to_string(script).unwrap_or_else(|e| {
                eprintln!("vdisk: cannot read script `{script}`: {e}");
                exit(1);
            });
            run_script(&mut ctx, &text);
        }
        None => run_interactive(&mut ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_honors_quotes() {
        assert_eq!(
            tokenize(r#"mkdir -path="/my folder" -p"#),
            vec!["mkdir", "-path=/my folder", "-p"]
        );
        assert_eq!(tokenize("  "), Vec::<String>::new());
        assert_eq!(
            tokenize("CAT -file1=/a.txt -file2=/b.txt"),
            vec!["CAT", "-file1=/a.txt", "-file2=/b.txt"]
        );
    }

    #[test]
    fn flags_parse_values_and_switches() {
        let tokens = tokenize("-size=10 -unit=K -p -cont=hello world");
        // `world` is not a flag.
        assert!(Flags::parse(&tokens).is_err());

        let tokens = tokenize(r#"-size=10 -unit=K -p -cont="hello world""#);
        let flags = Flags::parse(&tokens).unwrap();
        assert_eq!(flags.int("size").unwrap(), Some(10));
        assert_eq!(flags.value("unit"), Some("K"));
        assert!(flags.has("p"));
        assert_eq!(flags.value("cont"), Some("hello world"));
        assert_eq!(flags.int("missing").unwrap(), None);
        assert!(flags.require("missing").is_err());
    }

    #[test]
    fn numbered_files_keep_positional_order() {
        let flags = Flags::parse(&tokenize("-file2=/b -file1=/a -file10=/j")).unwrap();
        assert_eq!(flags.numbered_files(), vec!["/a", "/b", "/j"]);
    }

    #[test]
    fn script_scenario_end_to_end() {
        let disk_path = std::env::temp_dir().join(format!(
            "vdisk-shell-e2e-{}.mia",
            std::process::id()
        ));
        let _ = fs::remove_file(&disk_path);
        let mut ctx = Context::default();
        let run = |ctx: &mut Context, line: &str| -> String {
            execute(ctx, line, false).unwrap_or_else(|e| panic!("`{line}` failed: {e}"))
        };

        let d = disk_path.display();
        run(&mut ctx, &format!("mkdisk -size=5 -unit=M -fit=FF -path={d}"));
        run(&mut ctx, &format!("fdisk -size=1 -unit=M -path={d} -type=P -name=P1"));
        let out = run(&mut ctx, &format!("mount -path={d} -name=P1"));
        assert!(out.contains("061A"));
        run(&mut ctx, "mkfs -id=061A -fs=2fs");
        run(&mut ctx, "login -user=root -pass=123 -id=061A");
        run(&mut ctx, "mkdir -path=/home -p");
        run(
            &mut ctx,
            r#"mkfile -path=/home/a.txt -size=15 -cont="ABCDEFGHIJKLMNO""#,
        );
        assert_eq!(run(&mut ctx, "cat -file1=/home/a.txt"), "ABCDEFGHIJKLMNO\n");
        run(&mut ctx, "rename -path=/home/a.txt -name=b.txt");
        assert_eq!(
            run(&mut ctx, r#"find -path=/ -name="b.*""#),
            "/home/b.txt\n"
        );
        assert_eq!(
            run(&mut ctx, "cat -file1=/users.txt"),
            "1,G,root\n1,U,root,root,123\n"
        );
        run(&mut ctx, "remove -path=/home/b.txt");
        assert_eq!(run(&mut ctx, r#"find -path=/ -name="b.*""#), "");
        run(&mut ctx, "logout");
        run(&mut ctx, "unmount -id=061A");

        // Wrong commands surface errors instead of panicking.
        assert!(execute(&mut ctx, "frobnicate -x=1", false).is_err());
        assert!(execute(&mut ctx, "cat", false).is_err());

        fs::remove_file(&disk_path).unwrap();
    }
}
