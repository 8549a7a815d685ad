use std::collections::HashMap;

/// Server handles for statements prepared on this connection, keyed by their exact text.
///
/// Entries live as long as the connection. Statements that differ only in
/// whitespace or case are distinct entries.
#[derive(Debug, Default)]
pub(crate) struct PreparedCache {
    handles: HashMap<String, i64>,
}

impl PreparedCache {
    pub fn get(&self, sql: &str) -> Option<i64> {
        self.handles.get(sql).copied()
    }

    pub fn insert(&mut self, sql: &str, handle: i64) {
        self.handles.insert(sql.to_string(), handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }
}
