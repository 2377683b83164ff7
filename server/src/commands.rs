use std::sync::Arc;

use tracing::warn;

use crate::{codec::CommandRequest, store::Datastore};

pub const CAT_USAGE: &str = "usage: cat [file_name]";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Ls,
    Cat,
    Help,
    Clear,
}

const VERBS: [(&str, Verb); 4] = [
    ("ls", Verb::Ls),
    ("cat", Verb::Cat),
    ("help", Verb::Help),
    ("clear", Verb::Clear),
];

impl Verb {
    /// Exact, case-sensitive lookup.
    pub fn lookup(verb: &str) -> Option<Self> {
        VERBS
            .iter()
            .find(|(name, _)| *name == verb)
            .map(|(_, v)| *v)
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn Datastore>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    pub async fn execute(&self, req: &CommandRequest) -> String {
        match Verb::lookup(&req.verb) {
            Some(Verb::Ls) => self.list_directory(&req.directory).await,
            Some(Verb::Cat) => self.print_file(&req.argument).await,
            // `help` has no text yet; an empty `clear` reply tells the client to wipe the screen.
            Some(Verb::Help) | Some(Verb::Clear) => String::new(),
            None => format!("command not found: {}. Try using the 'help'", req.verb),
        }
    }

    async fn list_directory(&self, dir: &str) -> String {
        match self.store.names_in_dir(dir).await {
            Ok(names) => names.join(" "),
            Err(e) => {
                warn!(dir, error = %e, "cannot list directory");
                String::new()
            }
        }
    }

    async fn print_file(&self, name: &str) -> String {
        if name.is_empty() {
            return CAT_USAGE.to_string();
        }
        let body = match self.store.file_content(name).await {
            Ok(body) => body.unwrap_or_default(),
            Err(e) => {
                warn!(name, error = %e, "cannot read file");
                String::new()
            }
        };
        if body.is_empty() {
            return format!("cat: {name}: No such file or directory");
        }
        body
    }
}
