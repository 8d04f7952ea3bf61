//! In-memory `RemoteStore` used by unit and integration tests. The tree is
//! shared behind `Arc<Mutex<..>>` so a rebuild factory can hand out fresh
//! sessions over the same remote state, which is what the reconnect and
//! rotation tests observe.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use crate::error::SyncError;
use crate::remote::RemoteStore;

#[derive(Debug, Clone)]
pub struct MockFile {
    pub data: Vec<u8>,
    pub mtime: i64,
}

/// Server-side state, independent of any one session.
#[derive(Debug)]
pub struct RemoteTree {
    pub dirs: BTreeSet<String>,
    pub files: BTreeMap<String, MockFile>,
    /// mtime given to files created by STOR before any MFMT
    pub now: i64,
    pub connects: u32,
    pub stores: u32,
    pub deletes: Vec<String>,
}

impl RemoteTree {
    pub fn shared() -> Arc<Mutex<RemoteTree>> {
        let mut dirs = BTreeSet::new();
        dirs.insert("/".to_string());
        Arc::new(Mutex::new(RemoteTree {
            dirs,
            files: BTreeMap::new(),
            now: 1_700_000_000,
            connects: 0,
            stores: 0,
            deletes: Vec::new(),
        }))
    }

    pub fn add_dir(&mut self, path: &str) {
        let mut cur = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            cur.push('/');
            cur.push_str(part);
            self.dirs.insert(cur.clone());
        }
        self.dirs.insert("/".to_string());
    }

    pub fn add_file(&mut self, path: &str, data: &[u8], mtime: i64) {
        if let Some(pos) = path.rfind('/') {
            self.add_dir(&path[..pos.max(1)]);
        }
        self.files.insert(path.to_string(), MockFile { data: data.to_vec(), mtime });
    }

    fn parent_of(path: &str) -> String {
        match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(pos) => path[..pos].to_string(),
        }
    }
}

/// One live session over a shared tree. Fault injection fields simulate a
/// transport severed mid-stream; once severed the session stays dead until
/// replaced, like a real control connection.
pub struct MockRemote {
    tree: Arc<Mutex<RemoteTree>>,
    cwd: String,
    dead: bool,
    pub sever_retrieve_after: Option<u64>,
    pub sever_store_after: Option<u64>,
    /// lie about the size reported for every file (integrity tests)
    pub size_override: Option<u64>,
    /// pretend the server does not implement SIZE
    pub refuse_size: bool,
    /// some servers include "." and ".." in NLST replies
    pub list_dot_entries: bool,
}

impl MockRemote {
    pub fn connect(tree: Arc<Mutex<RemoteTree>>) -> MockRemote {
        tree.lock().unwrap().connects += 1;
        MockRemote {
            tree,
            cwd: "/".to_string(),
            dead: false,
            sever_retrieve_after: None,
            sever_store_after: None,
            size_override: None,
            refuse_size: false,
            list_dot_entries: false,
        }
    }

    pub fn kill(&mut self) {
        self.dead = true;
    }

    fn abs(&self, path: &str) -> String {
        let joined = if path.starts_with('/') {
            path.to_string()
        } else {
            crate::util::join_remote(&self.cwd, path)
        };
        let trimmed = joined.trim_end_matches('/');
        if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
    }

    fn check_alive(&self) -> Result<(), SyncError> {
        if self.dead {
            Err(SyncError::ConnectionLost("mock session closed".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RemoteStore for MockRemote {
    fn list(&mut self, dir: &str) -> Result<Vec<String>, SyncError> {
        self.check_alive()?;
        let a = self.abs(dir);
        let tree = self.tree.lock().unwrap();
        if !tree.dirs.contains(&a) {
            return Err(SyncError::RemoteMissing(a));
        }
        let mut names = Vec::new();
        if self.list_dot_entries {
            names.push(".".to_string());
            names.push("..".to_string());
        }
        for d in &tree.dirs {
            if d != &a && RemoteTree::parent_of(d) == a {
                names.push(crate::util::remote_basename(d).to_string());
            }
        }
        for f in tree.files.keys() {
            if RemoteTree::parent_of(f) == a {
                names.push(crate::util::remote_basename(f).to_string());
            }
        }
        Ok(names)
    }

    fn chdir(&mut self, dir: &str) -> Result<(), SyncError> {
        self.check_alive()?;
        let a = self.abs(dir);
        let tree = self.tree.lock().unwrap();
        if tree.dirs.contains(&a) {
            drop(tree);
            self.cwd = a;
            Ok(())
        } else {
            Err(SyncError::NotADirectory(a))
        }
    }

    fn updir(&mut self) -> Result<(), SyncError> {
        self.check_alive()?;
        self.cwd = RemoteTree::parent_of(&self.cwd);
        Ok(())
    }

    fn mkdir(&mut self, dir: &str) -> Result<(), SyncError> {
        self.check_alive()?;
        let a = self.abs(dir);
        let mut tree = self.tree.lock().unwrap();
        if tree.dirs.contains(&a) || tree.files.contains_key(&a) {
            return Err(SyncError::Protocol(format!("{}: already exists", a)));
        }
        let parent = RemoteTree::parent_of(&a);
        if !tree.dirs.contains(&parent) {
            return Err(SyncError::RemoteMissing(parent));
        }
        tree.dirs.insert(a);
        Ok(())
    }

    fn pwd(&mut self) -> Result<String, SyncError> {
        self.check_alive()?;
        Ok(self.cwd.clone())
    }

    fn mtime(&mut self, file: &str) -> Result<Option<i64>, SyncError> {
        self.check_alive()?;
        let a = self.abs(file);
        let tree = self.tree.lock().unwrap();
        Ok(tree.files.get(&a).map(|f| f.mtime))
    }

    fn set_mtime(&mut self, file: &str, epoch: i64) -> Result<(), SyncError> {
        self.check_alive()?;
        let a = self.abs(file);
        let mut tree = self.tree.lock().unwrap();
        match tree.files.get_mut(&a) {
            Some(f) => {
                f.mtime = epoch;
                Ok(())
            }
            None => Err(SyncError::RemoteMissing(a)),
        }
    }

    fn size(&mut self, file: &str) -> Result<Option<u64>, SyncError> {
        self.check_alive()?;
        if self.refuse_size {
            return Ok(None);
        }
        if let Some(n) = self.size_override {
            return Ok(Some(n));
        }
        let a = self.abs(file);
        let tree = self.tree.lock().unwrap();
        Ok(tree.files.get(&a).map(|f| f.data.len() as u64))
    }

    fn retrieve(&mut self, file: &str, sink: &mut dyn Write) -> Result<u64, SyncError> {
        self.check_alive()?;
        let a = self.abs(file);
        let data = {
            let tree = self.tree.lock().unwrap();
            match tree.files.get(&a) {
                Some(f) => f.data.clone(),
                None => return Err(SyncError::RemoteMissing(a)),
            }
        };
        if let Some(limit) = self.sever_retrieve_after {
            let partial = std::cmp::min(limit as usize, data.len());
            sink.write_all(&data[..partial])
                .map_err(|e| SyncError::Filesystem(a.clone(), e.to_string()))?;
            self.dead = true;
            return Err(SyncError::ConnectionLost(format!("{}: transfer severed", a)));
        }
        sink.write_all(&data).map_err(|e| SyncError::Filesystem(a.clone(), e.to_string()))?;
        Ok(data.len() as u64)
    }

    fn store(&mut self, source: &mut dyn Read, file: &str) -> Result<u64, SyncError> {
        self.check_alive()?;
        let a = self.abs(file);
        {
            let tree = self.tree.lock().unwrap();
            let parent = RemoteTree::parent_of(&a);
            if !tree.dirs.contains(&parent) {
                return Err(SyncError::RemoteMissing(parent));
            }
        }
        let mut data = Vec::new();
        source
            .read_to_end(&mut data)
            .map_err(|e| SyncError::Filesystem(a.clone(), e.to_string()))?;
        let mut tree = self.tree.lock().unwrap();
        tree.stores += 1;
        if let Some(limit) = self.sever_store_after {
            // partial upload remains visible on the server, like real debris
            let partial = std::cmp::min(limit as usize, data.len());
            let now = tree.now;
            tree.files.insert(a.clone(), MockFile { data: data[..partial].to_vec(), mtime: now });
            drop(tree);
            self.dead = true;
            return Err(SyncError::ConnectionLost(format!("{}: transfer severed", a)));
        }
        let now = tree.now;
        let len = data.len() as u64;
        tree.files.insert(a, MockFile { data, mtime: now });
        Ok(len)
    }

    fn delete(&mut self, file: &str) -> Result<(), SyncError> {
        self.check_alive()?;
        let a = self.abs(file);
        let mut tree = self.tree.lock().unwrap();
        if tree.files.remove(&a).is_none() {
            return Err(SyncError::RemoteMissing(a));
        }
        tree.deletes.push(a);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SyncError> {
        self.check_alive()?;
        let from_a = self.abs(from);
        let to_a = self.abs(to);
        let mut tree = self.tree.lock().unwrap();
        if tree.files.contains_key(&to_a) {
            return Err(SyncError::Protocol(format!("{}: rename target exists", to_a)));
        }
        match tree.files.remove(&from_a) {
            Some(f) => {
                tree.files.insert(to_a, f);
                Ok(())
            }
            None => Err(SyncError::RemoteMissing(from_a)),
        }
    }

    fn noop(&mut self) -> Result<(), SyncError> {
        self.check_alive()
    }

    fn quit(&mut self) -> Result<(), SyncError> {
        self.dead = true;
        Ok(())
    }
}
