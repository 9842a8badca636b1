//! Mock admin command transport.
//!
//! Stores registered commands and lets tests invoke them the way the
//! daemon's socket would, awaiting the rendered output.

use mirror_replayer::{AdminCommand, AdminRegistry, AdminRequest, AdminSender, OutputFormat};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[derive(Default)]
pub struct MockAdminRegistry {
    commands: Mutex<HashMap<String, (String, AdminSender)>>,
    rejected: Mutex<HashSet<String>>,
}

impl MockAdminRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make registration of `name` fail, as if the name were taken.
    pub fn reject(&self, name: &str) {
        self.rejected.lock().unwrap().insert(name.to_string());
    }

    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn help_for(&self, name: &str) -> Option<String> {
        self.commands
            .lock()
            .unwrap()
            .get(name)
            .map(|(help, _)| help.clone())
    }

    /// Invoke a registered command and await its output.
    ///
    /// Returns `None` when the command is not registered or the replayer
    /// never responded.
    pub async fn call(&self, name: &str, format: OutputFormat) -> Option<String> {
        let sender = self
            .commands
            .lock()
            .unwrap()
            .get(name)
            .map(|(_, sender)| sender.clone())?;

        // "rbd mirror <verb> <peer>"
        let verb = name.split_whitespace().nth(2)?;
        let command = match verb {
            "status" => AdminCommand::Status,
            "start" => AdminCommand::Start,
            "stop" => AdminCommand::Stop,
            "restart" => AdminCommand::Restart,
            "flush" => AdminCommand::Flush,
            _ => return None,
        };

        let (responder, response) = oneshot::channel();
        sender
            .send(AdminRequest {
                command,
                format,
                responder,
            })
            .ok()?;
        response.await.ok()
    }
}

impl AdminRegistry for MockAdminRegistry {
    fn register_command(
        &self,
        name: &str,
        help: &str,
        sender: AdminSender,
    ) -> Result<(), String> {
        if self.rejected.lock().unwrap().contains(name) {
            return Err(format!("command '{name}' already registered"));
        }
        self.commands
            .lock()
            .unwrap()
            .insert(name.to_string(), (help.to_string(), sender));
        Ok(())
    }

    fn unregister_command(&self, name: &str) {
        self.commands.lock().unwrap().remove(name);
    }
}
