//! The remote operations, each a single round trip.

use crate::client::TodoClient;
use crate::error::Result;
use crate::transport::Transport;
use crate::types::TodoItem;

pub struct RemoteClient<T> {
    client: TodoClient,
    transport: T,
}

impl<T: Transport> RemoteClient<T> {
    pub fn new(client: TodoClient, transport: T) -> Self {
        Self { client, transport }
    }

    pub fn list_remote(&self, revision: i64) -> Result<(Vec<TodoItem>, i64)> {
        let response = self.transport.execute(self.client.build_list(revision))?;
        self.client.parse_list(response)
    }

    /// Fetch one item as the server currently has it.
    pub fn get_remote(&self, id: &str, revision: i64) -> Result<(TodoItem, i64)> {
        let response = self.transport.execute(self.client.build_get(id, revision))?;
        self.client.parse_element(response)
    }

    pub fn create_remote(&self, item: &TodoItem, revision: i64) -> Result<(TodoItem, i64)> {
        let response = self.transport.execute(self.client.build_create(item, revision)?)?;
        self.client.parse_element(response)
    }

    pub fn update_remote(&self, item: &TodoItem, revision: i64) -> Result<(TodoItem, i64)> {
        let response = self.transport.execute(self.client.build_update(item, revision)?)?;
        self.client.parse_element(response)
    }

    pub fn delete_remote(&self, id: &str, revision: i64) -> Result<(TodoItem, i64)> {
        let response = self.transport.execute(self.client.build_delete(id, revision))?;
        self.client.parse_element(response)
    }

    pub fn replace_all_remote(&self, items: &[TodoItem], revision: i64) -> Result<(Vec<TodoItem>, i64)> {
        let response = self.transport.execute(self.client.build_replace_all(items, revision)?)?;
        self.client.parse_list(response)
    }
}
