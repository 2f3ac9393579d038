//! In-memory virtual filesystem — spec §4.5.
//!
//! A real inode arena rather than the teacher's flat `HashMap<String,
//! FsEntry>` (`arthur-zhang-just-bash::fs::in_memory_fs`): each directory
//! holds an ordered map from name to child `InodeId`, so the tree's parent
//! edges are explicit and hard links are simply two names sharing one
//! `InodeId`. Every call here is synchronous — there is no `async_trait`
//! bridge to drop, §5 rules out real suspension inside VFS operations
//! entirely.

use indexmap::IndexMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::VfsError;

pub type InodeId = usize;

pub const SYMLINK_DEPTH_LIMIT: u32 = 40;
pub const DEFAULT_UMASK: u16 = 0o022;

#[derive(Debug, Clone)]
pub enum InodeKind {
    File(Vec<u8>),
    Dir(IndexMap<String, InodeId>),
    Symlink(String),
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub kind: InodeKind,
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub mtime: u64,
    pub atime: u64,
    pub ctime: u64,
    pub nlink: u32,
}

impl Inode {
    fn new(kind: InodeKind, mode: u16, uid: u32, gid: u32) -> Self {
        let now = now_secs();
        Inode { kind, mode, uid, gid, mtime: now, atime: now, ctime: now, nlink: 1 }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, InodeKind::Dir(_))
    }
    pub fn is_file(&self) -> bool {
        matches!(self.kind, InodeKind::File(_))
    }
    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, InodeKind::Symlink(_))
    }

    pub fn size(&self) -> u64 {
        match &self.kind {
            InodeKind::File(b) => b.len() as u64,
            InodeKind::Symlink(s) => s.len() as u64,
            InodeKind::Dir(_) => 0,
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    WriteTruncate,
    WriteAppend,
    ReadWrite,
}

#[derive(Debug)]
pub struct Vfs {
    inodes: Vec<Option<Inode>>,
    root: InodeId,
    pub uid: u32,
    pub gid: u32,
    pub umask: u16,
    pub max_bytes: u64,
    used_bytes: u64,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    pub fn new() -> Self {
        let root = Inode::new(InodeKind::Dir(IndexMap::new()), 0o755, 1000, 1000);
        Vfs { inodes: vec![Some(root)], root: 0, uid: 1000, gid: 1000, umask: DEFAULT_UMASK, max_bytes: 64 * 1024 * 1024, used_bytes: 0 }
    }

    pub fn root(&self) -> InodeId {
        self.root
    }

    pub fn inode(&self, id: InodeId) -> &Inode {
        self.inodes[id].as_ref().expect("dangling inode id")
    }

    fn inode_mut(&mut self, id: InodeId) -> &mut Inode {
        self.inodes[id].as_mut().expect("dangling inode id")
    }

    fn alloc(&mut self, inode: Inode) -> InodeId {
        self.inodes.push(Some(inode));
        self.inodes.len() - 1
    }

    /// Splits an absolute or cwd-relative path into canonical components.
    /// A trailing `/` is preserved as a `force_dir` flag.
    fn split(cwd: &str, path: &str) -> (Vec<String>, bool) {
        let force_dir = path.ends_with('/') && path.len() > 1;
        let absolute = if path.starts_with('/') { path.to_string() } else { format!("{}/{}", cwd.trim_end_matches('/'), path) };
        let mut out: Vec<String> = Vec::new();
        for comp in absolute.split('/') {
            match comp {
                "" | "." => {}
                ".." => {
                    out.pop();
                }
                other => out.push(other.to_string()),
            }
        }
        (out, force_dir)
    }

    pub fn normalize(cwd: &str, path: &str) -> String {
        let (comps, _) = Self::split(cwd, path);
        if comps.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", comps.join("/"))
        }
    }

    /// Resolves a path to an inode, following symlinks (including the final
    /// component) up to `SYMLINK_DEPTH_LIMIT`.
    pub fn resolve(&self, cwd: &str, path: &str) -> Result<InodeId, VfsError> {
        self.resolve_with(cwd, path, true)
    }

    pub fn resolve_no_follow_final(&self, cwd: &str, path: &str) -> Result<InodeId, VfsError> {
        self.resolve_with(cwd, path, false)
    }

    fn resolve_with(&self, cwd: &str, path: &str, follow_final: bool) -> Result<InodeId, VfsError> {
        let (comps, force_dir) = Self::split(cwd, path);
        let id = self.resolve_components(self.root, &comps, follow_final, 0, path)?;
        if force_dir && !self.inode(id).is_dir() {
            return Err(VfsError::NotDir { path: path.to_string() });
        }
        Ok(id)
    }

    fn resolve_components(&self, mut cur: InodeId, comps: &[String], follow_final: bool, depth: u32, orig: &str) -> Result<InodeId, VfsError> {
        for (i, name) in comps.iter().enumerate() {
            let is_last = i == comps.len() - 1;
            let dir = self.inode(cur);
            let InodeKind::Dir(entries) = &dir.kind else {
                return Err(VfsError::NotDir { path: orig.to_string() });
            };
            let child = *entries.get(name).ok_or_else(|| VfsError::NotFound { path: orig.to_string() })?;
            cur = child;
            if self.inode(cur).is_symlink() && (!is_last || follow_final) {
                if depth >= SYMLINK_DEPTH_LIMIT {
                    return Err(VfsError::Loop { path: orig.to_string() });
                }
                let InodeKind::Symlink(target) = &self.inode(cur).kind else { unreachable!() };
                let (target_comps, _) = Self::split("/", target);
                cur = self.resolve_components(self.root, &target_comps, true, depth + 1, orig)?;
            }
        }
        Ok(cur)
    }

    fn parent_and_name(&self, cwd: &str, path: &str) -> Result<(InodeId, String), VfsError> {
        let (comps, _) = Self::split(cwd, path);
        let Some((name, parent_comps)) = comps.split_last() else {
            return Err(VfsError::Other { path: path.to_string(), message: "cannot operate on root".into() });
        };
        let parent = self.resolve_components(self.root, parent_comps, true, 0, path)?;
        if !self.inode(parent).is_dir() {
            return Err(VfsError::NotDir { path: path.to_string() });
        }
        Ok((parent, name.clone()))
    }

    pub fn stat(&self, cwd: &str, path: &str) -> Result<&Inode, VfsError> {
        let id = self.resolve(cwd, path)?;
        Ok(self.inode(id))
    }

    pub fn lstat(&self, cwd: &str, path: &str) -> Result<&Inode, VfsError> {
        let id = self.resolve_no_follow_final(cwd, path)?;
        Ok(self.inode(id))
    }

    pub fn exists(&self, cwd: &str, path: &str) -> bool {
        self.resolve(cwd, path).is_ok()
    }

    pub fn mkdir(&mut self, cwd: &str, path: &str, parents: bool) -> Result<(), VfsError> {
        let (comps, _) = Self::split(cwd, path);
        if comps.is_empty() {
            return Ok(());
        }
        if parents {
            let mut cur = self.root;
            for name in &comps {
                cur = match self.dir_child(cur, name) {
                    Some(id) if self.inode(id).is_dir() => id,
                    Some(_) => return Err(VfsError::Other { path: path.to_string(), message: "not a directory".into() }),
                    None => self.make_dir_entry(cur, name)?,
                };
            }
            return Ok(());
        }
        let (parent, name) = self.parent_and_name(cwd, path)?;
        if self.dir_child(parent, &name).is_some() {
            return Err(VfsError::Exists { path: path.to_string() });
        }
        self.make_dir_entry(parent, &name)?;
        Ok(())
    }

    fn dir_child(&self, dir: InodeId, name: &str) -> Option<InodeId> {
        match &self.inode(dir).kind {
            InodeKind::Dir(m) => m.get(name).copied(),
            _ => None,
        }
    }

    fn make_dir_entry(&mut self, parent: InodeId, name: &str) -> Result<InodeId, VfsError> {
        let mode = 0o777 & !self.umask;
        let new = self.alloc(Inode::new(InodeKind::Dir(IndexMap::new()), mode, self.uid, self.gid));
        if let InodeKind::Dir(m) = &mut self.inode_mut(parent).kind {
            m.insert(name.to_string(), new);
        }
        self.touch(parent);
        Ok(new)
    }

    fn touch(&mut self, id: InodeId) {
        let now = now_secs();
        let inode = self.inode_mut(id);
        inode.mtime = now;
        inode.ctime = now;
    }

    pub fn rmdir(&mut self, cwd: &str, path: &str) -> Result<(), VfsError> {
        let (parent, name) = self.parent_and_name(cwd, path)?;
        let child = self.dir_child(parent, &name).ok_or_else(|| VfsError::NotFound { path: path.to_string() })?;
        match &self.inode(child).kind {
            InodeKind::Dir(m) if !m.is_empty() => return Err(VfsError::Other { path: path.to_string(), message: "directory not empty".into() }),
            InodeKind::Dir(_) => {}
            _ => return Err(VfsError::NotDir { path: path.to_string() }),
        }
        self.unlink_entry(parent, &name);
        Ok(())
    }

    pub fn listdir(&self, cwd: &str, path: &str) -> Result<Vec<String>, VfsError> {
        let id = self.resolve(cwd, path)?;
        match &self.inode(id).kind {
            InodeKind::Dir(m) => Ok(m.keys().cloned().collect()),
            _ => Err(VfsError::NotDir { path: path.to_string() }),
        }
    }

    pub fn read(&mut self, cwd: &str, path: &str) -> Result<Vec<u8>, VfsError> {
        let id = self.resolve(cwd, path)?;
        self.touch_atime(id);
        match &self.inode(id).kind {
            InodeKind::File(b) => Ok(b.clone()),
            InodeKind::Dir(_) => Err(VfsError::IsDir { path: path.to_string() }),
            InodeKind::Symlink(_) => unreachable!("resolve follows symlinks"),
        }
    }

    fn touch_atime(&mut self, id: InodeId) {
        self.inode_mut(id).atime = now_secs();
    }

    pub fn write(&mut self, cwd: &str, path: &str, data: &[u8], mode: OpenMode) -> Result<(), VfsError> {
        let existing = self.resolve(cwd, path);
        let id = match existing {
            Ok(id) => {
                if self.inode(id).is_dir() {
                    return Err(VfsError::IsDir { path: path.to_string() });
                }
                id
            }
            Err(VfsError::NotFound { .. }) => {
                let (parent, name) = self.parent_and_name(cwd, path)?;
                let fmode = 0o666 & !self.umask;
                let new = self.alloc(Inode::new(InodeKind::File(Vec::new()), fmode, self.uid, self.gid));
                if let InodeKind::Dir(m) = &mut self.inode_mut(parent).kind {
                    m.insert(name, new);
                }
                self.touch(parent);
                new
            }
            Err(e) => return Err(e),
        };
        let additional = match mode {
            OpenMode::WriteAppend => data.len() as u64,
            _ => data.len().saturating_sub(self.inode(id).size() as usize) as u64,
        };
        if self.used_bytes + additional > self.max_bytes {
            return Err(VfsError::NoSpace { path: path.to_string() });
        }
        self.used_bytes += additional;
        let inode = self.inode_mut(id);
        if let InodeKind::File(buf) = &mut inode.kind {
            match mode {
                OpenMode::WriteAppend => buf.extend_from_slice(data),
                _ => *buf = data.to_vec(),
            }
        }
        let now = now_secs();
        inode.mtime = now;
        inode.ctime = now;
        Ok(())
    }

    pub fn truncate(&mut self, cwd: &str, path: &str, len: u64) -> Result<(), VfsError> {
        let id = self.resolve(cwd, path)?;
        match &mut self.inode_mut(id).kind {
            InodeKind::File(b) => b.resize(len as usize, 0),
            _ => return Err(VfsError::IsDir { path: path.to_string() }),
        }
        self.touch(id);
        Ok(())
    }

    pub fn unlink(&mut self, cwd: &str, path: &str) -> Result<(), VfsError> {
        let (parent, name) = self.parent_and_name(cwd, path)?;
        let child = self.dir_child(parent, &name).ok_or_else(|| VfsError::NotFound { path: path.to_string() })?;
        if self.inode(child).is_dir() {
            return Err(VfsError::IsDir { path: path.to_string() });
        }
        self.unlink_entry(parent, &name);
        Ok(())
    }

    fn unlink_entry(&mut self, parent: InodeId, name: &str) {
        let removed = if let InodeKind::Dir(m) = &mut self.inode_mut(parent).kind { m.shift_remove(name) } else { None };
        self.touch(parent);
        if let Some(id) = removed {
            let inode = self.inode_mut(id);
            inode.nlink -= 1;
            if inode.nlink == 0 {
                let size = inode.size();
                self.used_bytes = self.used_bytes.saturating_sub(size);
                self.inodes[id] = None;
            }
        }
    }

    pub fn rename(&mut self, cwd: &str, from: &str, to: &str) -> Result<(), VfsError> {
        let (src_parent, src_name) = self.parent_and_name(cwd, from)?;
        let child = self.dir_child(src_parent, &src_name).ok_or_else(|| VfsError::NotFound { path: from.to_string() })?;
        let (dst_parent, dst_name) = self.parent_and_name(cwd, to)?;
        if let InodeKind::Dir(m) = &mut self.inode_mut(src_parent).kind {
            m.shift_remove(&src_name);
        }
        if let InodeKind::Dir(m) = &mut self.inode_mut(dst_parent).kind {
            m.insert(dst_name, child);
        }
        self.touch(src_parent);
        self.touch(dst_parent);
        Ok(())
    }

    pub fn symlink(&mut self, cwd: &str, target: &str, link_path: &str) -> Result<(), VfsError> {
        let (parent, name) = self.parent_and_name(cwd, link_path)?;
        if self.dir_child(parent, &name).is_some() {
            return Err(VfsError::Exists { path: link_path.to_string() });
        }
        let id = self.alloc(Inode::new(InodeKind::Symlink(target.to_string()), 0o777, self.uid, self.gid));
        if let InodeKind::Dir(m) = &mut self.inode_mut(parent).kind {
            m.insert(name, id);
        }
        self.touch(parent);
        Ok(())
    }

    /// Creates a hard link: a second directory entry sharing one `InodeId`,
    /// so the two names really do reference one inode (spec §3 "Hard links
    /// are shared inode references").
    pub fn link(&mut self, cwd: &str, existing: &str, new_path: &str) -> Result<(), VfsError> {
        let target = self.resolve(cwd, existing)?;
        if self.inode(target).is_dir() {
            return Err(VfsError::Other { path: new_path.to_string(), message: "hard links to directories are forbidden".into() });
        }
        let (parent, name) = self.parent_and_name(cwd, new_path)?;
        if self.dir_child(parent, &name).is_some() {
            return Err(VfsError::Exists { path: new_path.to_string() });
        }
        if let InodeKind::Dir(m) = &mut self.inode_mut(parent).kind {
            m.insert(name, target);
        }
        self.inode_mut(target).nlink += 1;
        Ok(())
    }

    pub fn readlink(&self, cwd: &str, path: &str) -> Result<String, VfsError> {
        let id = self.resolve_no_follow_final(cwd, path)?;
        match &self.inode(id).kind {
            InodeKind::Symlink(t) => Ok(t.clone()),
            _ => Err(VfsError::Other { path: path.to_string(), message: "invalid argument".into() }),
        }
    }

    pub fn chmod(&mut self, cwd: &str, path: &str, mode: u16) -> Result<(), VfsError> {
        let id = self.resolve(cwd, path)?;
        self.inode_mut(id).mode = mode;
        self.touch(id);
        Ok(())
    }

    pub fn utimes(&mut self, cwd: &str, path: &str, mtime: u64) -> Result<(), VfsError> {
        let id = self.resolve(cwd, path)?;
        self.inode_mut(id).mtime = mtime;
        Ok(())
    }

    /// Permission check for `open`/traversal: `root` (uid 0) bypasses.
    pub fn check_access(&self, inode: &Inode, want_read: bool, want_write: bool, want_exec: bool) -> Result<(), VfsError> {
        if self.uid == 0 {
            return Ok(());
        }
        let mode = inode.mode;
        let (r_bit, w_bit, x_bit) = if inode.uid == self.uid {
            (0o400, 0o200, 0o100)
        } else if inode.gid == self.gid {
            (0o040, 0o020, 0o010)
        } else {
            (0o004, 0o002, 0o001)
        };
        if (want_read && mode & r_bit == 0) || (want_write && mode & w_bit == 0) || (want_exec && mode & x_bit == 0) {
            return Err(VfsError::Permission { path: String::new() });
        }
        Ok(())
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut vfs = Vfs::new();
        vfs.write("/", "/f.txt", b"hello", OpenMode::WriteTruncate).unwrap();
        assert_eq!(vfs.read("/", "/f.txt").unwrap(), b"hello");
    }

    #[test]
    fn mkdir_parents_then_nested_write() {
        let mut vfs = Vfs::new();
        vfs.mkdir("/", "/a/b/c", true).unwrap();
        vfs.write("/", "/a/b/c/f", b"x", OpenMode::WriteTruncate).unwrap();
        assert_eq!(vfs.listdir("/", "/a/b/c").unwrap(), vec!["f".to_string()]);
    }

    #[test]
    fn unlink_removes_entry() {
        let mut vfs = Vfs::new();
        vfs.write("/", "/f", b"x", OpenMode::WriteTruncate).unwrap();
        vfs.unlink("/", "/f").unwrap();
        assert!(matches!(vfs.resolve("/", "/f"), Err(VfsError::NotFound { .. })));
    }

    #[test]
    fn symlink_loop_is_detected() {
        let mut vfs = Vfs::new();
        vfs.symlink("/", "/b", "/a").unwrap();
        vfs.symlink("/", "/a", "/b").unwrap();
        assert!(matches!(vfs.resolve("/", "/a"), Err(VfsError::Loop { .. })));
    }

    #[test]
    fn hard_link_shares_inode_and_survives_one_unlink() {
        let mut vfs = Vfs::new();
        vfs.write("/", "/f", b"x", OpenMode::WriteTruncate).unwrap();
        vfs.link("/", "/f", "/g").unwrap();
        vfs.unlink("/", "/f").unwrap();
        assert_eq!(vfs.read("/", "/g").unwrap(), b"x");
    }

    #[test]
    fn rmdir_rejects_non_empty_directory() {
        let mut vfs = Vfs::new();
        vfs.mkdir("/", "/d", false).unwrap();
        vfs.write("/", "/d/f", b"x", OpenMode::WriteTruncate).unwrap();
        assert!(matches!(vfs.rmdir("/", "/d"), Err(VfsError::Other { .. })));
    }

    #[test]
    fn quota_rejects_oversized_write() {
        let mut vfs = Vfs::new();
        vfs.max_bytes = 4;
        assert!(matches!(vfs.write("/", "/f", b"hello", OpenMode::WriteTruncate), Err(VfsError::NoSpace { .. })));
    }
}
