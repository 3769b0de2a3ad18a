
// A scripted bus that records every command.  Cloning shares the script, so a test can keep a handle
// after moving the bus into a controller.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, ErrorKind};
use std::rc::Rc;

use log::debug;

use crate::error::Result;

use super::Bus;

#[derive(Default)]
struct Script {
	writes: Vec<String>,
	pending_query: Option<String>,
	once: HashMap<String, VecDeque<Vec<u8>>>,
	always: HashMap<String, Vec<u8>>,
	clears: usize,
	closed: bool,
}

#[derive(Clone, Default)]
pub struct MockBus {
	script: Rc<RefCell<Script>>,
}

impl MockBus {

	pub fn new() -> Self { Self::default() }

	// Reply given every time `cmd` is read back, unless a one-shot reply is queued
	pub fn respond_to<R: Into<Vec<u8>>>(&self, cmd:&str, reply:R) {
		self.script.borrow_mut().always.insert(cmd.to_owned(), reply.into());
	}

	// Replies consumed in order before falling back to `respond_to`
	pub fn queue_response<R: Into<Vec<u8>>>(&self, cmd:&str, reply:R) {
		self.script.borrow_mut().once.entry(cmd.to_owned()).or_default().push_back(reply.into());
	}

	pub fn writes(&self) -> Vec<String> { self.script.borrow().writes.clone() }

	pub fn forget_writes(&self) { self.script.borrow_mut().writes.clear(); }

	pub fn count(&self, cmd:&str) -> usize { self.script.borrow().writes.iter().filter(|w| *w == cmd).count() }

	pub fn clears(&self) -> usize { self.script.borrow().clears }

	pub fn is_closed(&self) -> bool { self.script.borrow().closed }

}

impl Bus for MockBus {

	fn write(&mut self, cmd:&str) -> Result<()> {
		let cmd = cmd.trim_end_matches('\n');
		debug!(">> {}", cmd);
		let mut script = self.script.borrow_mut();
		script.writes.push(cmd.to_owned());
		script.pending_query = Some(cmd.to_owned());
		Ok(())
	}

	fn read_raw(&mut self) -> Result<Vec<u8>> {
		let mut script = self.script.borrow_mut();
		let cmd = script.pending_query.take()
			.ok_or_else(|| io::Error::new(ErrorKind::TimedOut, "Read without a preceding query"))?;

		if let Some(reply) = script.once.get_mut(&cmd).and_then(|q| q.pop_front()) {
			return Ok(reply);
		}
		match script.always.get(&cmd) {
			Some(reply) => Ok(reply.clone()),
			None        => Err(io::Error::new(ErrorKind::TimedOut, format!("No reply scripted for '{}'", cmd)).into()),
		}
	}

	fn clear(&mut self) -> Result<()> {
		self.script.borrow_mut().clears += 1;
		Ok(())
	}

	fn close(&mut self) -> Result<()> {
		self.script.borrow_mut().closed = true;
		Ok(())
	}

}
