//! Registries of open child handles

use parking_lot::Mutex;

/// Open children of a handle in the order they were opened.
pub(crate) struct Registry<T> {
    items: Mutex<Vec<(u64, T)>>,
}

impl<T: Clone> Registry<T> {
    pub(crate) fn new() -> Self {
        Self { items: Mutex::new(Vec::new()) }
    }

    pub(crate) fn add(&self, id: u64, item: T) {
        self.items.lock().push((id, item));
    }

    pub(crate) fn remove(&self, id: u64) -> Option<T> {
        let mut items = self.items.lock();
        let pos = items.iter().position(|(item_id, _)| *item_id == id)?;
        Some( items.remove(pos).1 )
    }

    /// Returns a copy of the current children. Close cascades iterate over the copy
    /// as children remove themselves while they close.
    pub(crate) fn snapshot(&self) -> Vec<T> {
        self.items.lock().iter().map(|(_, item)| item.clone()).collect()
    }

    /// Returns the most recently opened child.
    pub(crate) fn last(&self) -> Option<T> {
        self.items.lock().last().map(|(_, item)| item.clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Builds the system name of a child handle, like `E1S3S2` for session 2 of server 3 of environment 1.
pub(crate) fn sys_name(parent: &str, tag: char, id: u64) -> String {
    format!("{}{}{}", parent, tag, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_open_order() {
        let reg = Registry::new();
        reg.add(1, "a");
        reg.add(5, "b");
        reg.add(3, "c");
        assert_eq!(reg.snapshot(), vec!["a", "b", "c"]);
        assert_eq!(reg.last(), Some("c"));
        assert_eq!(reg.remove(5), Some("b"));
        assert_eq!(reg.remove(5), None);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.remove(3), Some("c"));
        assert_eq!(reg.last(), Some("a"));
    }

    #[test]
    fn names() {
        let env = sys_name("", 'E', 1);
        let srv = sys_name(&env, 'S', 3);
        let ses = sys_name(&srv, 'S', 2);
        let stmt = sys_name(&ses, 'S', 7);
        assert_eq!(sys_name(&stmt, 'R', 4), "E1S3S2S7R4");
    }
}
