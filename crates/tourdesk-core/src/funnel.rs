//! Sales funnels and their ordered stages.
//!
//! Stage positions are always dense (`0..n`) and follow the order of
//! [`Funnel::stages`].

use serde::{Deserialize, Serialize};

use crate::error::{CrmError, ValidationError};
use crate::types::{AgencyId, FunnelId, StageId, Timestamp};
use crate::validation::{optional_text, required_text};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub funnel_id: FunnelId,
    pub name: String,
    pub position: u32,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funnel {
    pub id: FunnelId,
    pub agency_id: AgencyId,
    pub name: String,
    pub is_default: bool,
    pub stages: Vec<Stage>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFunnel {
    pub name: String,
    pub stages: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStage {
    pub name: String,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub color: Option<String>,
}

impl Funnel {
    /// Stages are created in the given order
    pub fn create(
        agency_id: AgencyId,
        input: NewFunnel,
        is_default: bool,
        now: Timestamp,
    ) -> Result<Self, CrmError> {
        let name = required_text("name", &input.name)?;
        if input.stages.is_empty() {
            return Err(ValidationError::Empty { field: "stages" }.into());
        }

        let mut funnel = Self {
            id: FunnelId::new(),
            agency_id,
            name,
            is_default,
            stages: Vec::with_capacity(input.stages.len()),
            created_at: now,
        };
        for stage in &input.stages {
            funnel.add_stage(NewStage {
                name: stage.clone(),
                ..Default::default()
            })?;
        }
        Ok(funnel)
    }

    #[must_use]
    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Where new clients land
    #[must_use]
    pub fn first_stage(&self) -> Option<&Stage> {
        self.stages.first()
    }

    /// Insert at `position` (clamped), or append
    pub fn add_stage(&mut self, input: NewStage) -> Result<StageId, CrmError> {
        let name = required_text("stage name", &input.name)?;
        self.ensure_unique_name(&name, None)?;

        let stage = Stage {
            id: StageId::new(),
            funnel_id: self.id,
            name,
            position: 0,
            color: optional_text(input.color.as_deref()),
        };
        let id = stage.id;
        let at = input
            .position
            .map_or(self.stages.len(), |p| (p as usize).min(self.stages.len()));
        self.stages.insert(at, stage);
        self.renumber();
        Ok(id)
    }

    pub fn rename_stage(&mut self, id: StageId, name: &str) -> Result<(), CrmError> {
        let name = required_text("stage name", name)?;
        self.ensure_unique_name(&name, Some(id))?;
        let stage = self
            .stages
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| CrmError::not_found("stage", id))?;
        stage.name = name;
        Ok(())
    }

    /// `order` must list every stage exactly once
    pub fn reorder_stages(&mut self, order: &[StageId]) -> Result<(), CrmError> {
        let is_permutation = order.len() == self.stages.len()
            && order.iter().all(|id| self.stage(*id).is_some())
            && order
                .iter()
                .enumerate()
                .all(|(i, id)| !order[..i].contains(id));
        if !is_permutation {
            return Err(ValidationError::Invalid {
                field: "stage order",
                reason: "must list every stage of the funnel exactly once".to_string(),
            }
            .into());
        }

        let mut reordered = Vec::with_capacity(self.stages.len());
        for id in order {
            if let Some(pos) = self.stages.iter().position(|s| s.id == *id) {
                reordered.push(self.stages.remove(pos));
            }
        }
        self.stages = reordered;
        self.renumber();
        Ok(())
    }

    /// `occupants` is the number of clients currently in the stage
    pub fn remove_stage(&mut self, id: StageId, occupants: usize) -> Result<Stage, CrmError> {
        let pos = self
            .stages
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| CrmError::not_found("stage", id))?;
        if occupants > 0 {
            return Err(CrmError::Conflict(format!(
                "stage '{}' still holds {occupants} client(s)",
                self.stages[pos].name
            )));
        }
        if self.stages.len() == 1 {
            return Err(CrmError::Conflict(
                "a funnel must keep at least one stage".to_string(),
            ));
        }
        let removed = self.stages.remove(pos);
        self.renumber();
        Ok(removed)
    }

    fn ensure_unique_name(&self, name: &str, except: Option<StageId>) -> Result<(), CrmError> {
        let folded = name.to_lowercase();
        let taken = self
            .stages
            .iter()
            .any(|s| Some(s.id) != except && s.name.to_lowercase() == folded);
        if taken {
            return Err(ValidationError::Duplicate {
                field: "stage name",
                value: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn renumber(&mut self) {
        for (i, stage) in self.stages.iter_mut().enumerate() {
            stage.position = u32::try_from(i).unwrap_or(u32::MAX);
        }
    }
}
