use std::path::Path;

use ionogram_core::Record;
use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::window::day_slots;

/// Advisory outcome: the first height resolution seen and every file that
/// disagrees with it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolutionReport {
    pub first: Option<u32>,
    pub divergent: Vec<String>,
    pub checked: usize,
}

impl ResolutionReport {
    fn observe(&mut self, name: String, resolution: u32) {
        self.checked += 1;
        match self.first {
            None => self.first = Some(resolution),
            Some(first) if first != resolution => self.divergent.push(name),
            Some(_) => {}
        }
    }

    pub fn log(&self) {
        match self.first {
            Some(first) => info!(
                resolution = first,
                checked = self.checked,
                "first record resolution"
            ),
            None => warn!("no source records found for the resolution check"),
        }
        if self.divergent.is_empty() {
            return;
        }
        warn!(
            count = self.divergent.len(),
            "records with a resolution different from the first one"
        );
        for name in &self.divergent {
            warn!("*** {name} ***");
        }
    }
}

pub fn check_resolution<F>(config: &BatchConfig, start_second: u32, load: F) -> ResolutionReport
where
    F: Fn(&Path) -> ionogram_core::Result<Record>,
{
    let mut report = ResolutionReport::default();
    for date in config.days() {
        let dir = config.input_dir.render(date);
        for slot in day_slots(date, start_second) {
            let name = slot.file_name();
            let path = dir.join(&name);
            if !path.exists() {
                continue;
            }
            match load(&path) {
                Ok(record) => {
                    debug!(file = %name, resolution = record.resolution(), "checked");
                    report.observe(name, record.resolution());
                }
                Err(err) => warn!(path = %path.display(), error = %err, "cannot check resolution"),
            }
        }
    }
    report
}
