//! Append-only journal file backing `MemoryStore`.
//!
//! Every frame is `[u32 le: payload len][bincode: Event][u32 le: crc32 of payload]`.
//! Replay stops at the first frame that is torn or fails its checksum, so a
//! crash mid-write loses at most the group commit that was in flight.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

fn write_frame(out: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    out.write_all(&(payload.len() as u32).to_le_bytes())?;
    out.write_all(&payload)?;
    out.write_all(&crc32fast::hash(&payload).to_le_bytes())
}

/// Fill `buf` completely. `false` when the input ends first.
fn fill(input: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match input.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact frame, or `None` at the end of the usable journal.
fn read_frame(input: &mut impl Read) -> io::Result<Option<Event>> {
    let mut header = [0u8; 4];
    if !fill(input, &mut header)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(header) as usize];
    let mut trailer = [0u8; 4];
    if !fill(input, &mut payload)? || !fill(input, &mut trailer)? {
        return Ok(None);
    }
    if u32::from_le_bytes(trailer) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize(&payload).ok())
}

fn sync(out: &mut BufWriter<File>) -> io::Result<()> {
    out.flush()?;
    out.get_ref().sync_all()
}

/// Open journal file. Owned by the store's writer task; nothing else writes it.
pub struct Journal {
    out: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Journal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write a group of events and fsync once for all of them.
    pub fn append_batch<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> io::Result<()> {
        let mut written = 0;
        let mut result = Ok(());
        for event in events {
            if let Err(e) = write_frame(&mut self.out, event) {
                result = Err(e);
                break;
            }
            written += 1;
        }
        // Flush even when a write failed so no half group stays buffered for the next one.
        let synced = sync(&mut self.out);
        result?;
        synced?;
        self.appends_since_compact += written;
        Ok(())
    }

    /// Where a compaction stages its rewrite of the journal at `path`.
    pub fn staging_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write `events` to the staging file and fsync it. Runs without access to
    /// the open journal, so appends continue while it works.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(Self::staging_path(path))?);
        for event in events {
            write_frame(&mut out, event)?;
        }
        sync(&mut out)
    }

    /// Append `tail` (everything committed since the snapshot was taken) to the
    /// staging file, then rename it over the journal and continue there.
    pub fn swap_compact_file(&mut self, tail: &[Event]) -> io::Result<()> {
        let staging = Self::staging_path(&self.path);
        {
            let mut out = BufWriter::new(OpenOptions::new().append(true).open(&staging)?);
            for event in tail {
                write_frame(&mut out, event)?;
            }
            sync(&mut out)?;
        }
        fs::rename(&staging, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.out = BufWriter::new(file);
        self.appends_since_compact = tail.len() as u64;
        Ok(())
    }

    /// Every intact event in the journal at `path`, oldest first. A missing
    /// file is an empty journal.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut input = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(event) = read_frame(&mut input)? {
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScoreRecord, Tenant, VisitEvent};

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("scorekeep_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(Journal::staging_path(&path));
        path
    }

    fn tenant(id: i64) -> Event {
        Event::TenantInserted(Tenant {
            id,
            name: format!("tenant-{id}"),
            display_name: format!("Tenant {id}"),
            created_at: 1,
            updated_at: 1,
        })
    }

    fn visits(n: usize) -> Event {
        Event::VisitsInserted {
            events: (0..n)
                .map(|i| VisitEvent {
                    player_id: format!("p{i}"),
                    tenant_id: 1,
                    competition_id: "c1".into(),
                    visited_at: i as i64,
                })
                .collect(),
        }
    }

    #[test]
    fn group_commit_replays_in_order() {
        let path = tmp_path("group_commit.wal");
        let first = vec![
            tenant(1),
            Event::ScoresInserted {
                rows: vec![ScoreRecord {
                    id: "a".into(),
                    tenant_id: 1,
                    player_id: "p1".into(),
                    competition_id: "c1".into(),
                    score: 10,
                    row_num: 1,
                    created_at: 1,
                    updated_at: 1,
                }],
            },
        ];
        let second = vec![tenant(2)];

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append_batch(&first).unwrap();
            journal.append_batch(&second).unwrap();
            assert_eq!(journal.appends_since_compact(), 3);
        }

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed[..2], first[..]);
        assert_eq!(replayed[2], second[0]);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let path = tmp_path("torn.wal");
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append_batch([&tenant(7)]).unwrap();
        }
        {
            // Length prefix plus two payload bytes of a frame that never finished.
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[40, 0, 0, 0, 1, 2]).unwrap();
        }

        assert_eq!(Journal::replay(&path).unwrap(), vec![tenant(7)]);
    }

    #[test]
    fn missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        assert!(Journal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn checksum_mismatch_ends_replay() {
        let path = tmp_path("bad_crc.wal");
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append_batch([&tenant(1)]).unwrap();
        }
        {
            let payload = bincode::serialize(&Event::IdHighWaterSaved { value: 9 }).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }
        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append_batch([&tenant(2)]).unwrap();
        }

        // Nothing past the bad frame is trusted.
        assert_eq!(Journal::replay(&path).unwrap(), vec![tenant(1)]);
    }

    #[test]
    fn compaction_keeps_appends_made_while_staging() {
        let path = tmp_path("staged.wal");
        let snapshot = vec![tenant(1), visits(1)];
        let during = Event::IdHighWaterSaved { value: 42 };
        let after = tenant(2);

        let mut journal = Journal::open(&path).unwrap();
        for _ in 0..20 {
            journal.append_batch([&visits(10)]).unwrap();
        }
        let before = fs::metadata(&path).unwrap().len();

        Journal::write_compact_file(&path, &snapshot).unwrap();
        // Still appending to the live file until the swap.
        journal.append_batch([&during]).unwrap();
        journal.swap_compact_file(std::slice::from_ref(&during)).unwrap();
        assert_eq!(journal.appends_since_compact(), 1);
        assert!(fs::metadata(&path).unwrap().len() < before);
        assert!(!Journal::staging_path(&path).exists());

        journal.append_batch([&after]).unwrap();
        drop(journal);

        assert_eq!(Journal::replay(&path).unwrap(), vec![tenant(1), visits(1), during, after]);
    }
}
