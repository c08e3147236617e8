//! Dumb console progress reporting

use std::io::Write;

use crate::dep::{DepGraph, DepId};
use crate::progress::Progress;

pub struct DumbConsoleProgress;

impl Progress for DumbConsoleProgress {
    fn prepare(&self, _config: &super::ProgressConfig) {}

    fn build_started(&self, graph: &DepGraph, id: DepId, status: &super::ProgressStatus) {
        print!("[{}/{}] ", status.started + 1, status.total);
        println!("{}", graph.get(id).human_readable());
    }

    fn stdout_line(&self, _graph: &DepGraph, _id: DepId, chunk: &[u8]) {
        std::io::stdout().write_all(chunk).unwrap();
    }

    fn build_finished(&self, _graph: &DepGraph, _id: DepId, _success: bool, _status: &super::ProgressStatus) {}

    fn finish(&self) {}
}
