use crate::config::LabelsConfig;
use std::{
    fs::File,
    io::{self, BufRead},
    path::PathBuf,
};

pub trait State: Send + Sync + 'static {
    fn new(labels_cfg: &LabelsConfig) -> Result<Self, String>
    where
        Self: Sized;
    fn get_labels(&self) -> &[String];

    fn label_for(&self, class_index: usize) -> Option<&str> {
        self.get_labels().get(class_index).map(String::as_str)
    }
}

#[derive(Debug)]
pub struct ServiceState {
    class_labels: Vec<String>,
}

impl State for ServiceState {
    fn new(labels_cfg: &LabelsConfig) -> Result<ServiceState, String> {
        match load_severity_labels(&labels_cfg.get_path()) {
            Ok(labels) => Ok(ServiceState {
                class_labels: labels,
            }),
            Err(e) => Err(format!("Failed to load labels: {}", e)),
        }
    }

    fn get_labels(&self) -> &[String] {
        &self.class_labels
    }
}

pub fn load_severity_labels(filepath: &PathBuf) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    parse_severity_labels(io::BufReader::new(file))
}

/// One label per line, ordered by class index. Blank lines are skipped.
fn parse_severity_labels<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.trim();
        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }

    if labels.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "labels file contains no labels",
        ));
    }

    Ok(labels)
}
