//! Point-in-time view of the OS process table.

use std::collections::{HashMap, HashSet, VecDeque};

use super::Pid;

/// Live pids at one instant, with their parent pid when the platform reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    parents: HashMap<Pid, Option<Pid>>,
}

impl ProcessSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from pids without parent information.
    pub fn from_pids(pids: impl IntoIterator<Item = Pid>) -> Self {
        Self {
            parents: pids.into_iter().map(|pid| (pid, None)).collect(),
        }
    }

    pub fn insert(&mut self, pid: Pid, ppid: Option<Pid>) {
        self.parents.insert(pid, ppid);
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.parents.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// All descendants of `root`, breadth first, excluding `root` itself.
    pub fn descendants(&self, root: Pid) -> Vec<Pid> {
        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (&pid, &ppid) in &self.parents {
            if let Some(ppid) = ppid {
                if ppid != pid {
                    children.entry(ppid).or_default().push(pid);
                }
            }
        }

        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        let mut out = Vec::new();
        while let Some(pid) = queue.pop_front() {
            for &child in children.get(&pid).into_iter().flatten() {
                if seen.insert(child) {
                    out.push(child);
                    queue.push_back(child);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: u32) -> Pid {
        Pid::new(raw).unwrap()
    }

    #[test]
    fn test_descendants_walks_whole_tree() {
        let mut snap = ProcessSnapshot::new();
        snap.insert(pid(1), None);
        snap.insert(pid(10), Some(pid(1)));
        snap.insert(pid(11), Some(pid(10)));
        snap.insert(pid(12), Some(pid(10)));
        snap.insert(pid(13), Some(pid(12)));
        snap.insert(pid(20), Some(pid(1)));

        let mut tree = snap.descendants(pid(10));
        tree.sort();
        assert_eq!(tree, vec![pid(11), pid(12), pid(13)]);
        assert!(snap.descendants(pid(13)).is_empty());
    }

    #[test]
    fn test_from_pids_has_no_tree() {
        let snap = ProcessSnapshot::from_pids([pid(5), pid(6)]);
        assert!(snap.contains(pid(5)));
        assert!(!snap.contains(pid(7)));
        assert!(snap.descendants(pid(5)).is_empty());
    }
}
