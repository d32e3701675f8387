use serde::{Deserialize, Serialize};

use crate::{
    column_family::{ColumnFamilyDescriptor, ColumnFamilyOptions},
    segment::SegmentMeta,
    util::{Result, Status},
};

/// Persisted state of one column family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyManifest {
    pub name: String,
    pub options: ColumnFamilyOptions,
    /// Live segments, oldest first
    pub segments: Vec<SegmentMeta>,
    /// Logs numbered below this hold only flushed data
    #[serde(default)]
    pub log_number: u64,
}

/// Persisted state of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableManifest {
    pub name: String,
    pub enabled: bool,
    pub families: Vec<FamilyManifest>,
    pub next_file_number: u64,
}

impl TableManifest {
    pub fn new(name: &str, families: &[ColumnFamilyDescriptor]) -> Self {
        TableManifest {
            name: name.to_string(),
            enabled: true,
            families: families
                .iter()
                .map(|desc| FamilyManifest {
                    name: desc.name.clone(),
                    options: desc.options.clone(),
                    segments: Vec::new(),
                    log_number: 0,
                })
                .collect(),
            next_file_number: 1,
        }
    }

    pub fn family(&self, name: &str) -> Option<&FamilyManifest> {
        self.families.iter().find(|f| f.name == name)
    }

    fn family_mut(&mut self, name: &str) -> Result<&mut FamilyManifest> {
        self.families
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| Status::unknown_family(name))
    }

    pub fn descriptors(&self) -> Vec<ColumnFamilyDescriptor> {
        self.families
            .iter()
            .map(|f| ColumnFamilyDescriptor::new(f.name.clone(), f.options.clone()))
            .collect()
    }
}

/// One change to a family's segment list
#[derive(Debug, Clone)]
pub enum SegmentChange {
    /// A flushed segment, newest of the family
    Add(SegmentMeta),
    /// Compaction output taking the place of its inputs; `None` when every
    /// input cell was dropped
    Replace {
        inputs: Vec<u64>,
        output: Option<SegmentMeta>,
    },
}

/// A ManifestEdit represents the changes between two manifest states
#[derive(Debug, Default, Clone)]
pub struct ManifestEdit {
    pub enabled: Option<bool>,
    pub next_file_number: Option<u64>,
    /// (family, change)
    pub segment_changes: Vec<(String, SegmentChange)>,
    /// (family, log number)
    pub log_numbers: Vec<(String, u64)>,
}

impl ManifestEdit {
    pub fn new() -> Self {
        ManifestEdit::default()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = Some(enabled);
    }

    pub fn set_next_file_number(&mut self, num: u64) {
        self.next_file_number = Some(num);
    }

    pub fn set_log_number(&mut self, family: &str, num: u64) {
        self.log_numbers.push((family.to_string(), num));
    }

    pub fn add_segment(&mut self, family: &str, meta: SegmentMeta) {
        self.segment_changes
            .push((family.to_string(), SegmentChange::Add(meta)));
    }

    pub fn replace_segments(
        &mut self,
        family: &str,
        inputs: Vec<u64>,
        output: Option<SegmentMeta>,
    ) {
        self.segment_changes
            .push((family.to_string(), SegmentChange::Replace { inputs, output }));
    }

    /// Produce the state that results from applying this edit to `base`
    ///
    /// Fails without side effects when the edit names an unknown family or a
    /// segment that is not live.
    pub fn apply(&self, base: &TableManifest) -> Result<TableManifest> {
        let mut next = base.clone();

        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        if let Some(num) = self.next_file_number {
            next.next_file_number = next.next_file_number.max(num);
        }

        for (family, change) in &self.segment_changes {
            let family = next.family_mut(family)?;
            match change {
                SegmentChange::Add(meta) => family.segments.push(meta.clone()),
                SegmentChange::Replace { inputs, output } => {
                    replace(family, inputs, output.as_ref())?;
                },
            }
        }

        for (family, num) in &self.log_numbers {
            let family = next.family_mut(family)?;
            family.log_number = family.log_number.max(*num);
        }

        Ok(next)
    }
}

fn replace(
    family: &mut FamilyManifest,
    inputs: &[u64],
    output: Option<&SegmentMeta>,
) -> Result<()> {
    let mut position = None;
    for id in inputs {
        let index = family
            .segments
            .iter()
            .position(|s| s.id == *id)
            .ok_or_else(|| {
                Status::invalid_argument(format!("Segment {id} is not live in {}", family.name))
            })?;
        position = Some(position.map_or(index, |p: usize| p.min(index)));
    }

    let position = position.unwrap_or(0);
    family.segments.retain(|s| !inputs.contains(&s.id));
    if let Some(output) = output {
        family.segments.insert(position, output.clone());
    }
    Ok(())
}
