// source.rs — On-disk kernel description
//
// The CLI reads one JSON object:
//
//   {
//     "device": "cpu",
//     "domains": "{[i]: 0<=i<n}" | ["...", ...],
//     "instructions": "out[i] = a[i]" | ["...", ...],
//     "args": [{"name": "n", "kind": "value", "dtype": "int32"}, ...],
//     "options": {"defines": {...}, "temporary_variables": {...}, ...}
//   }
//
// Only `domains` and `instructions` are required.

use serde::Deserialize;

use crate::kernel::KernelArgument;
use crate::options::KernelOptions;
use crate::pipeline::KernelInputs;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

fn default_device() -> String {
    "cpu".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelSource {
    #[serde(default = "default_device")]
    pub device: String,
    pub domains: OneOrMany,
    pub instructions: OneOrMany,
    #[serde(default)]
    pub args: Vec<KernelArgument>,
    #[serde(default)]
    pub options: KernelOptions,
}

impl KernelSource {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn into_inputs(self) -> KernelInputs {
        KernelInputs::new(self.domains.into_vec(), self.instructions.into_vec())
            .with_args(self.args)
            .with_options(self.options)
            .with_device(self.device)
    }
}
