//! Interactive command shell over a [`Volume`].
//!
//! Reads one command per line, prints results or errors, and keeps going until
//! `exit` or end of input.

use super::*;
use error::VolumeError;
use volume::Volume;

use log::debug;
use std::io::{self, BufRead, Write};

pub const PROMPT: &str = "flatfs$ ";

pub const HELP: &str = "The following commands are supported:
ls [<directory>] - list directory content.
cat <path> - show file content.
touch <path> - create empty file.
edit <path> - re-set file content from the next input line.
rm <path> - remove file.
mkdir <name> - create a directory.
rmdir <name> - remove empty directory.
mv <src> <dst> - rename a file or directory.
stat <path> - show entry details.
df - show table and data region usage.
format - wipe the volume.
help - show this help message.
exit - gracefully exit.
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List(String),
    Cat(String),
    Touch(String),
    Edit(String),
    Remove(String),
    MakeDir(String),
    RemoveDir(String),
    Move(String, String),
    Stat(String),
    Usage,
    Format,
    Help,
    Exit,
}

impl Command {
    /// `Ok(None)` for a blank line, `Err` carries a message for the user.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some((&cmd, rest)) = args.split_first() else {
            return Ok(None);
        };
        let one = |usage: &str| -> Result<String, String> {
            rest.first()
                .map(|s| s.to_string())
                .ok_or_else(|| format!("Usage: {} {}", cmd, usage))
        };
        let command = match cmd {
            "ls" => Command::List(rest.first().unwrap_or(&"/").to_string()),
            "cat" => Command::Cat(one("<path>")?),
            "touch" => Command::Touch(one("<path>")?),
            "edit" => Command::Edit(one("<path>")?),
            "rm" => Command::Remove(one("<path>")?),
            "mkdir" => Command::MakeDir(one("<name>")?),
            "rmdir" => Command::RemoveDir(one("<name>")?),
            "stat" => Command::Stat(one("<path>")?),
            "mv" => match rest {
                [src, dst, ..] => Command::Move(src.to_string(), dst.to_string()),
                _ => return Err(format!("Usage: {} <src> <dst>", cmd)),
            },
            "df" => Command::Usage,
            "format" => Command::Format,
            "help" => Command::Help,
            "exit" => Command::Exit,
            other => return Err(format!("unknown command: {}", other)),
        };
        Ok(Some(command))
    }
}

pub struct Shell<'a, R, W> {
    volume: &'a mut Volume,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> Shell<'a, R, W> {
    pub fn new(volume: &'a mut Volume, input: R, output: W) -> Self {
        Self {
            volume,
            input,
            output,
        }
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    pub fn run(&mut self) -> io::Result<()> {
        writeln!(self.output, "Welcome to flatfs")?;
        writeln!(
            self.output,
            "To get help, please type 'help' on the prompt below.\n"
        )?;
        loop {
            write!(self.output, "{}", PROMPT)?;
            self.output.flush()?;
            let Some(line) = self.read_line()? else {
                writeln!(self.output)?;
                return Ok(());
            };
            match Command::parse(&line) {
                Ok(None) => {}
                Ok(Some(Command::Exit)) => return Ok(()),
                Ok(Some(command)) => {
                    debug!("shell: {:?}", command);
                    if let Err(e) = self.execute(command)? {
                        writeln!(self.output, "{}", e)?;
                    }
                }
                Err(msg) => writeln!(self.output, "{}", msg)?,
            }
        }
    }

    /// Outer error: the terminal broke. Inner error: the command failed.
    pub fn execute(&mut self, command: Command) -> io::Result<Result<(), VolumeError>> {
        let result = match command {
            Command::List(path) => match self.volume.list_dir(&path) {
                Ok(entries) => {
                    for entry in entries {
                        let suffix = if entry.is_directory { "/" } else { "" };
                        writeln!(self.output, "{}{} {}", entry.name, suffix, entry.size)?;
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Command::Cat(path) => match self.volume.get_content(&path) {
                Ok(content) => {
                    writeln!(self.output, "{}", String::from_utf8_lossy(&content))?;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Command::Touch(path) => self.volume.create_entry(&path, false),
            Command::Edit(path) => match self.volume.stat(&path).map(|e| e.is_directory) {
                Ok(true) => Err(VolumeError::IsDirectory(path)),
                Ok(false) => {
                    writeln!(self.output, "Enter new file content")?;
                    let content = self.read_line()?.unwrap_or_default();
                    self.volume.set_content(&path, content.as_bytes())
                }
                Err(e) => Err(e),
            },
            Command::Remove(path) => self.volume.remove_entry(&path),
            Command::MakeDir(name) => self.volume.create_entry(&name, true),
            Command::RemoveDir(name) => self.volume.remove_dir(&name),
            Command::Move(src, dst) => self.volume.rename(&src, &dst),
            Command::Stat(path) => match self.volume.stat(&path) {
                Ok(entry) => {
                    let kind = if entry.is_directory { "directory" } else { "file" };
                    writeln!(
                        self.output,
                        "{}: {}, {} bytes at offset {}",
                        entry.name, kind, entry.size, entry.block_start
                    )?;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Command::Usage => {
                writeln!(
                    self.output,
                    "entries: {} of {}\ndata: {} of {} bytes",
                    self.volume.len(),
                    self.volume.max_entries(),
                    self.volume.used_bytes(),
                    self.volume.capacity_bytes()
                )?;
                Ok(())
            }
            Command::Format => self.volume.format(),
            Command::Help => {
                write!(self.output, "{}", HELP)?;
                Ok(())
            }
            Command::Exit => Ok(()),
        };
        Ok(result)
    }
}
