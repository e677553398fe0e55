//! Front-end collaborators driven by the bridge
//!
//! The bridge never draws anything itself. Dialogs, the result list, the
//! detail page and parse results are handed to these traits; the CLI plugs in
//! [`ConsoleFrontend`].

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Key/value record passed through from a plugin
pub type Record = Map<String, Value>;

/// One entry of a search result listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    pub name: String,
    pub pic_url: String,
    pub url: String,
}

/// Modal dialogs
pub trait UserInterface {
    fn warn(&self, title: &str, message: &str);
    fn confirm(&self, message: &str) -> bool;
}

/// Search result list and detail page
pub trait ResultView {
    fn clear(&self);
    fn add_item(&self, item: ResultItem);
    fn open_detail(&self, record: Record);
}

/// Receiver of finished parses
pub trait ParseSink {
    fn parse_finished(&self, record: Record);
}

/// The collaborators a bridge talks to
#[derive(Clone)]
pub struct Frontend {
    pub ui: Rc<dyn UserInterface>,
    pub results: Rc<dyn ResultView>,
    pub sink: Rc<dyn ParseSink>,
}

impl Frontend {
    /// Use one object for all three roles
    pub fn shared<T>(frontend: Rc<T>) -> Self
    where
        T: UserInterface + ResultView + ParseSink + 'static,
    {
        Self {
            ui: frontend.clone(),
            results: frontend.clone(),
            sink: frontend,
        }
    }
}

/// Terminal front end
pub struct ConsoleFrontend {
    assume_yes: bool,
    output: RefCell<Box<dyn Write>>,
    input: RefCell<Box<dyn BufRead>>,
}

impl ConsoleFrontend {
    pub fn new(assume_yes: bool) -> Self {
        Self::with_io(
            assume_yes,
            Box::new(io::stdout()),
            Box::new(io::BufReader::new(io::stdin())),
        )
    }

    pub fn with_io(assume_yes: bool, output: Box<dyn Write>, input: Box<dyn BufRead>) -> Self {
        Self {
            assume_yes,
            output: RefCell::new(output),
            input: RefCell::new(input),
        }
    }

    fn emit(&self, text: &str) {
        let mut out = self.output.borrow_mut();
        if let Err(e) = writeln!(out, "{}", text).and_then(|_| out.flush()) {
            warn!(error = %e, "failed to write to console");
        }
    }

    fn emit_record(&self, heading: &str, record: &Record) {
        match serde_json::to_string_pretty(record) {
            Ok(json) => self.emit(&format!("{}:\n{}", heading, json)),
            Err(e) => warn!(error = %e, "failed to render record"),
        }
    }
}

impl UserInterface for ConsoleFrontend {
    fn warn(&self, title: &str, message: &str) {
        self.emit(&format!("[{}] {}", title, message.trim_end()));
    }

    fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            self.emit(&format!("{} [y/N] y", message));
            return true;
        }

        {
            let mut out = self.output.borrow_mut();
            let _ = write!(out, "{} [y/N] ", message).and_then(|_| out.flush());
        }
        let mut answer = String::new();
        if let Err(e) = self.input.borrow_mut().read_line(&mut answer) {
            warn!(error = %e, "failed to read answer");
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

impl ResultView for ConsoleFrontend {
    fn clear(&self) {
        self.emit("Results:");
    }

    fn add_item(&self, item: ResultItem) {
        self.emit(&format!("  {}\n    url: {}\n    pic: {}", item.name, item.url, item.pic_url));
    }

    fn open_detail(&self, record: Record) {
        self.emit_record("Detail", &record);
    }
}

impl ParseSink for ConsoleFrontend {
    fn parse_finished(&self, record: Record) {
        self.emit_record("Parse result", &record);
    }
}
