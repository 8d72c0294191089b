// src/codec.rs

//! Line-oriented commit list, the hand-off between reconstruction and replay
//!
//! ```text
//! Commit:<ticks>\t\tAuthor:<author>\t\tComment:<comment>
//! Label: <ticks>\t\t<text>
//! \t<version>:<ticks>:<file spec>
//! ```
//!
//! Timestamps are ticks of 100ns since 0001-01-01 UTC. Newlines in every
//! free-text field are written as [`SENTINEL`] and restored on read; carriage
//! returns are dropped. A field that already contained the sentinel reads
//! back with a newline in its place. Tabs in an author become spaces, since
//! the author is delimited by a tab pair.

use crate::interner::Identities;
use crate::model::{Commit, FileChange, LabelEvent};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Stand-in for a newline inside a single-line field
pub const SENTINEL: char = '\u{1}';

const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

const COMMIT_PREFIX: &str = "Commit:";
const AUTHOR_SEP: &str = "\t\tAuthor:";
const COMMENT_SEP: &str = "\t\tComment:";
const LABEL_PREFIX: &str = "Label: ";
const FIELD_SEP: &str = "\t\t";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("line {line}: {reason}: {text:?}")]
    Parse {
        line: usize,
        text: String,
        reason: &'static str,
    },
}

pub fn to_ticks(timestamp: DateTime<Utc>) -> i64 {
    UNIX_EPOCH_TICKS + timestamp.timestamp() * TICKS_PER_SECOND + i64::from(timestamp.timestamp_subsec_nanos() / 100)
}

pub fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let relative = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let secs = relative.div_euclid(TICKS_PER_SECOND);
    let nanos = (relative.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

fn escape(text: &str) -> String {
    text.chars()
        .filter(|&c| c != '\r')
        .map(|c| if c == '\n' { SENTINEL } else { c })
        .collect()
}

fn escape_author(author: &str) -> String {
    escape(author).replace('\t', " ")
}

fn unescape(text: &str) -> String {
    text.replace(SENTINEL, "\n")
}

/// Render commits in list order
pub fn encode(commits: &[Commit], ids: &Identities) -> String {
    let mut out = String::new();
    for commit in commits {
        out.push_str(&format!(
            "{COMMIT_PREFIX}{}{AUTHOR_SEP}{}{COMMENT_SEP}{}\n",
            to_ticks(commit.timestamp),
            escape_author(ids.user(commit.author)),
            escape(&commit.comment)
        ));
        for label in &commit.labels {
            out.push_str(&format!(
                "{LABEL_PREFIX}{}{FIELD_SEP}{}\n",
                to_ticks(label.timestamp),
                escape(&label.text)
            ));
        }
        for (file, change) in &commit.files {
            out.push_str(&format!(
                "\t{}:{}:{}\n",
                change.version,
                to_ticks(change.timestamp),
                escape(ids.file(*file))
            ));
        }
    }
    out
}

struct Reader<'a> {
    ids: &'a mut Identities,
    commits: Vec<Commit>,
    open: Option<(usize, String, Commit)>,
}

impl Reader<'_> {
    fn finish_open(&mut self) -> Result<(), CodecError> {
        if let Some((line, text, commit)) = self.open.take() {
            if commit.files.is_empty() {
                return Err(CodecError::Parse {
                    line,
                    text,
                    reason: "commit has no files",
                });
            }
            self.commits.push(commit);
        }
        Ok(())
    }

    fn line(&mut self, line_no: usize, line: &str) -> Result<(), CodecError> {
        let fail = |reason| CodecError::Parse {
            line: line_no,
            text: line.to_string(),
            reason,
        };
        let ticks = |s: &str| s.parse::<i64>().ok().and_then(from_ticks).ok_or_else(|| fail("bad timestamp"));

        if line.is_empty() {
            return Ok(());
        }

        if let Some(rest) = line.strip_prefix(COMMIT_PREFIX) {
            self.finish_open()?;
            let (stamp, rest) = rest.split_once(AUTHOR_SEP).ok_or_else(|| fail("missing author"))?;
            let (author, comment) = rest.split_once(COMMENT_SEP).ok_or_else(|| fail("missing comment"))?;
            let commit = Commit {
                timestamp: ticks(stamp)?,
                author: self.ids.users.intern(&unescape(author)),
                comment: unescape(comment),
                files: BTreeMap::new(),
                labels: Vec::new(),
            };
            self.open = Some((line_no, line.to_string(), commit));
            return Ok(());
        }

        let (_, _, commit) = self.open.as_mut().ok_or_else(|| fail("record outside a commit"))?;

        if let Some(rest) = line.strip_prefix(LABEL_PREFIX) {
            let (stamp, text) = rest.split_once(FIELD_SEP).ok_or_else(|| fail("missing label text"))?;
            commit.labels.push(LabelEvent {
                text: unescape(text),
                timestamp: ticks(stamp)?,
            });
        } else if let Some(rest) = line.strip_prefix('\t') {
            let mut parts = rest.splitn(3, ':');
            let (Some(version), Some(stamp), Some(spec)) = (parts.next(), parts.next(), parts.next()) else {
                return Err(fail("expected version:ticks:file"));
            };
            let version = version.parse::<u32>().map_err(|_| fail("bad version"))?;
            let change = FileChange {
                version,
                timestamp: ticks(stamp)?,
            };
            let file = self.ids.files.intern(&unescape(spec));
            if commit.files.insert(file, change).is_some() {
                return Err(fail("file listed twice"));
            }
        } else {
            return Err(fail("unrecognized record"));
        }
        Ok(())
    }
}

/// Parse a commit list, interning every author and file spec into `ids`
pub fn decode(text: &str, ids: &mut Identities) -> Result<Vec<Commit>, CodecError> {
    let mut reader = Reader {
        ids,
        commits: Vec::new(),
        open: None,
    };
    for (idx, line) in text.lines().enumerate() {
        reader.line(idx + 1, line)?;
    }
    reader.finish_open()?;
    Ok(reader.commits)
}

pub fn save(path: &Path, commits: &[Commit], ids: &Identities) -> Result<(), CodecError> {
    fs::write(path, encode(commits, ids)).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Wrote {} commits to {}", commits.len(), path.display());
    Ok(())
}

pub fn load(path: &Path, ids: &mut Identities) -> Result<Vec<Commit>, CodecError> {
    let text = fs::read_to_string(path).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&text, ids)
}

/// Human-readable companion log; never read back
pub fn write_audit_log<W: Write>(out: &mut W, commits: &[Commit], ids: &Identities) -> io::Result<()> {
    for (n, commit) in commits.iter().enumerate() {
        writeln!(
            out,
            "#{} {} {} {}",
            n + 1,
            to_ticks(commit.timestamp),
            commit.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            ids.user(commit.author)
        )?;
        for line in commit.comment.lines() {
            writeln!(out, "    {}", line)?;
        }
        for label in &commit.labels {
            writeln!(out, "  label {} ({})", label.text, label.timestamp.format("%Y-%m-%d %H:%M:%S"))?;
        }
        for (file, change) in &commit.files {
            writeln!(out, "  {} v{}", ids.file(*file), change.version)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn save_audit_log(path: &Path, commits: &[Commit], ids: &Identities) -> Result<(), CodecError> {
    let io_err = |source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    write_audit_log(&mut out, commits, ids).map_err(io_err)?;
    out.flush().map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn sample(ids: &mut Identities) -> Vec<Commit> {
        let t0 = Utc.with_ymd_and_hms(2003, 4, 5, 6, 7, 8).unwrap();
        let t1 = t0 + chrono::Duration::milliseconds(1500);
        let mut files = BTreeMap::new();
        files.insert(ids.files.intern("$/proj/a.c"), FileChange { version: 3, timestamp: t0 });
        files.insert(ids.files.intern("$/proj/dir:x/b.h"), FileChange { version: 7, timestamp: t1 });
        let first = Commit {
            timestamp: t1,
            author: ids.users.intern("Jane Doe <jane@example.com>"),
            comment: "first line\nsecond\tline".to_string(),
            files,
            labels: vec![LabelEvent {
                text: "RELEASE 1.0".to_string(),
                timestamp: t1,
            }],
        };
        let mut files = BTreeMap::new();
        files.insert(ids.files.intern("$/proj/a.c"), FileChange { version: 4, timestamp: t1 });
        let second = Commit {
            timestamp: t1,
            author: ids.users.intern("bob"),
            comment: String::new(),
            files,
            labels: Vec::new(),
        };
        vec![first, second]
    }

    #[test]
    fn test_ticks_match_dotnet_epoch() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(to_ticks(epoch), 621_355_968_000_000_000);
        assert_eq!(from_ticks(621_355_968_000_000_001), Some(epoch + chrono::Duration::nanoseconds(100)));
        let before = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap() + chrono::Duration::milliseconds(250);
        assert_eq!(from_ticks(to_ticks(before)), Some(before));
    }

    #[test]
    fn test_layout() {
        let mut ids = Identities::new();
        let commits = sample(&mut ids);
        let text = encode(&commits, &ids);
        let lines: Vec<&str> = text.lines().collect();
        let ticks = to_ticks(commits[0].timestamp);

        assert_eq!(
            lines[0],
            format!("Commit:{ticks}\t\tAuthor:Jane Doe <jane@example.com>\t\tComment:first line\u{1}second\tline")
        );
        assert_eq!(lines[1], format!("Label: {ticks}\t\tRELEASE 1.0"));
        assert!(lines[2].starts_with("\t3:"));
        assert!(lines[2].ends_with(":$/proj/a.c"));
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_read_reproduces_written_commits() -> Result<()> {
        let mut ids = Identities::new();
        let commits = sample(&mut ids);
        let text = encode(&commits, &ids);
        assert_eq!(decode(&text, &mut ids)?, commits);

        // a fresh context resolves to the same strings
        let mut fresh = Identities::new();
        let reread = decode(&text, &mut fresh)?;
        assert_eq!(encode(&reread, &fresh), text);
        Ok(())
    }

    #[test]
    fn test_carriage_returns_dropped() -> Result<()> {
        let mut ids = Identities::new();
        let mut commits = sample(&mut ids);
        commits[0].comment = "a\r\nb\r".to_string();
        let reread = decode(&encode(&commits, &ids), &mut ids)?;
        assert_eq!(reread[0].comment, "a\nb");
        Ok(())
    }

    #[test]
    fn test_literal_sentinel_reads_back_as_newline() -> Result<()> {
        let mut ids = Identities::new();
        let mut commits = sample(&mut ids);
        commits[0].comment = "x\u{1}y".to_string();
        let reread = decode(&encode(&commits, &ids), &mut ids)?;
        assert_eq!(reread[0].comment, "x\ny");
        Ok(())
    }

    #[test]
    fn test_author_and_file_spec_cannot_break_records() -> Result<()> {
        let mut ids = Identities::new();
        let mut commits = sample(&mut ids);
        commits[1].author = ids.users.intern("mallory\nLabel: 1\t\tComment:forged");
        let odd = ids.files.intern("$/proj/odd\n\t1:0:$/x.c");
        let ts = commits[1].timestamp;
        commits[1].files.insert(odd, FileChange { version: 1, timestamp: ts });

        let text = encode(&commits, &ids);
        assert_eq!(text.lines().count(), 7);

        let mut fresh = Identities::new();
        let reread = decode(&text, &mut fresh)?;
        assert_eq!(reread.len(), 2);
        assert_eq!(fresh.user(reread[1].author), "mallory\nLabel: 1  Comment:forged");
        assert_eq!(reread[1].comment, "");
        assert!(reread[1].labels.is_empty());
        let specs: Vec<&str> = reread[1].files.keys().map(|f| fresh.file(*f)).collect();
        assert_eq!(specs, vec!["$/proj/a.c", "$/proj/odd\n\t1:0:$/x.c"]);
        Ok(())
    }

    #[test]
    fn test_parse_errors_are_fatal() {
        let mut ids = Identities::new();
        let cases = [
            ("\t1:0:$/a", 1),
            ("Commit:abc\t\tAuthor:a\t\tComment:", 1),
            ("Commit:621355968000000000\t\tAuthor:a\t\tComment:\nbogus", 2),
            ("Commit:621355968000000000\t\tAuthor:a\t\tComment:\n\tx:0:$/a", 2),
            ("Commit:621355968000000000\t\tAuthor:a\t\tComment:\nLabel: 5", 2),
            ("Commit:621355968000000000\t\tAuthor:a\t\tComment:", 1),
            ("Commit:621355968000000000\t\tComment:", 1),
        ];
        for (text, expected) in cases {
            match decode(text, &mut ids) {
                Err(CodecError::Parse { line, .. }) => assert_eq!(line, expected, "{text:?}"),
                other => panic!("expected parse error for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_list() -> Result<()> {
        let mut ids = Identities::new();
        assert_eq!(encode(&[], &ids), "");
        assert!(decode("", &mut ids)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_load_and_audit_log() -> Result<()> {
        let dir = tempdir()?;
        let mut ids = Identities::new();
        let commits = sample(&mut ids);
        let path = dir.path().join("commits.txt");
        save(&path, &commits, &ids)?;
        assert_eq!(load(&path, &mut ids)?, commits);

        let log_path = dir.path().join("commits.log");
        save_audit_log(&log_path, &commits, &ids)?;
        let log = std::fs::read_to_string(log_path)?;
        assert!(log.starts_with("#1 "));
        assert!(log.contains("2003-04-05 06:07:09 UTC Jane Doe <jane@example.com>"));
        assert!(log.contains("    second\tline"));
        assert!(log.contains("  $/proj/dir:x/b.h v7"));
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let mut ids = Identities::new();
        assert!(matches!(
            load(Path::new("/nonexistent/commits.txt"), &mut ids),
            Err(CodecError::Io { .. })
        ));
    }
}
