//! Immutable bone hierarchy shared by every pose and graph built for a character.

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::math::Transform;

/// Serialized form of a single bone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoneDefinition {
    pub id: String,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub reference: Transform,
}

/// Named per-bone weight table, referenced by bone-mask nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneMaskDefinition {
    pub id: String,
    pub weights: Vec<f32>,
}

/// Serialized skeleton asset.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SkeletonDefinition {
    pub bones: Vec<BoneDefinition>,
    #[serde(default)]
    pub bone_masks: Vec<BoneMaskDefinition>,
}

#[derive(Debug)]
pub struct Skeleton {
    bone_ids: Vec<String>,
    parents: Vec<Option<usize>>,
    parent_space_reference: Vec<Transform>,
    model_space_reference: Vec<Transform>,
    bone_masks: Vec<BoneMaskDefinition>,
}

impl Skeleton {
    /// Build a skeleton, validating that every parent precedes its child.
    pub fn new(
        bone_ids: Vec<String>,
        parents: Vec<Option<usize>>,
        parent_space_reference: Vec<Transform>,
    ) -> GraphResult<Self> {
        if bone_ids.len() != parents.len() || bone_ids.len() != parent_space_reference.len() {
            return Err(GraphError::InvalidSkeleton(format!(
                "{} bone ids, {} parent indices, {} reference transforms",
                bone_ids.len(),
                parents.len(),
                parent_space_reference.len()
            )));
        }
        for (idx, parent) in parents.iter().enumerate() {
            if let Some(parent) = *parent {
                if parent >= idx {
                    return Err(GraphError::InvalidSkeleton(format!(
                        "bone {idx} (`{}`) has parent {parent}, parents must precede children",
                        bone_ids[idx]
                    )));
                }
            }
        }

        let mut model_space_reference: Vec<Transform> = Vec::with_capacity(parents.len());
        for (idx, local) in parent_space_reference.iter().enumerate() {
            let model = match parents[idx] {
                Some(parent) => Transform::compose(local, &model_space_reference[parent]),
                None => *local,
            };
            model_space_reference.push(model);
        }

        Ok(Self {
            bone_ids,
            parents,
            parent_space_reference,
            model_space_reference,
            bone_masks: Vec::new(),
        })
    }

    pub fn from_definition(definition: SkeletonDefinition) -> GraphResult<Self> {
        let mut ids = Vec::with_capacity(definition.bones.len());
        let mut parents = Vec::with_capacity(definition.bones.len());
        let mut reference = Vec::with_capacity(definition.bones.len());
        for bone in definition.bones {
            ids.push(bone.id);
            parents.push(bone.parent);
            reference.push(bone.reference);
        }
        let mut skeleton = Self::new(ids, parents, reference)?;
        for mask in definition.bone_masks {
            skeleton.add_bone_mask(mask)?;
        }
        Ok(skeleton)
    }

    pub fn from_json(json: &str) -> GraphResult<Self> {
        let definition: SkeletonDefinition = serde_json::from_str(json)?;
        Self::from_definition(definition)
    }

    /// Register a named bone mask. Weights must cover every bone and lie in `[0, 1]`.
    pub fn add_bone_mask(&mut self, mask: BoneMaskDefinition) -> GraphResult<()> {
        if mask.weights.len() != self.num_bones() {
            return Err(GraphError::InvalidSkeleton(format!(
                "bone mask `{}` has {} weights for {} bones",
                mask.id,
                mask.weights.len(),
                self.num_bones()
            )));
        }
        if let Some(w) = mask.weights.iter().find(|w| !(0.0..=1.0).contains(*w)) {
            return Err(GraphError::InvalidSkeleton(format!(
                "bone mask `{}` has weight {w} outside [0,1]",
                mask.id
            )));
        }
        self.bone_masks.push(mask);
        Ok(())
    }

    #[inline]
    pub fn num_bones(&self) -> usize {
        self.bone_ids.len()
    }

    pub fn bone_id(&self, idx: usize) -> &str {
        &self.bone_ids[idx]
    }

    pub fn bone_index(&self, id: &str) -> Option<usize> {
        self.bone_ids.iter().position(|b| b == id)
    }

    #[inline]
    pub fn parent(&self, idx: usize) -> Option<usize> {
        self.parents[idx]
    }

    pub fn parent_indices(&self) -> &[Option<usize>] {
        &self.parents
    }

    /// True if `parent` appears anywhere on `child`'s parent chain.
    pub fn is_child_of(&self, child: usize, parent: usize) -> bool {
        let mut current = self.parents[child];
        while let Some(idx) = current {
            if idx == parent {
                return true;
            }
            current = self.parents[idx];
        }
        false
    }

    pub fn parent_space_reference_pose(&self) -> &[Transform] {
        &self.parent_space_reference
    }

    pub fn model_space_reference_pose(&self) -> &[Transform] {
        &self.model_space_reference
    }

    pub fn bone_mask_index(&self, id: &str) -> Option<usize> {
        self.bone_masks.iter().position(|m| m.id == id)
    }

    pub fn bone_mask(&self, idx: usize) -> &BoneMaskDefinition {
        &self.bone_masks[idx]
    }
}
