//! Data descriptors: how to interpret a signal's payload

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Ratio, SampleType, Scalar};
use crate::{ReaderError, Result};

/// Unit of a value or domain axis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Unit {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default = "Unit::default_id")]
    pub id: i32,
}

impl Unit {
    fn default_id() -> i32 {
        -1
    }

    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        quantity: impl Into<String>,
    ) -> Self {
        Unit { symbol: symbol.into(), name: name.into(), quantity: quantity.into(), id: -1 }
    }

    /// The only unit time conversion accepts.
    pub fn seconds() -> Self {
        Unit::new("s", "second", "time")
    }
}

/// How sample values are produced for a packet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DataRule {
    /// Every sample is stored in the packet payload.
    #[default]
    Explicit,
    /// `packet.offset + start + delta * index`; the payload is empty.
    Linear { delta: Scalar, start: Scalar },
    /// Every sample equals `value`; the payload is empty.
    Constant { value: Scalar },
}

impl DataRule {
    pub fn linear(delta: i64, start: i64) -> Self {
        DataRule::Linear { delta: Scalar::Int(delta), start: Scalar::Int(start) }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, DataRule::Explicit)
    }
}

/// Linear post-scaling applied in [`ReadMode::Scaled`](crate::ReadMode::Scaled).
///
/// The payload stores `input_type` values; the scaled value is
/// `raw * scale + offset` interpreted as `output_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostScaling {
    pub input_type: SampleType,
    pub output_type: SampleType,
    pub scale: f64,
    pub offset: f64,
}

impl PostScaling {
    pub fn apply(&self, raw: Scalar) -> Scalar {
        Scalar::Float(raw.as_f64() * self.scale + self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub low: f64,
    pub high: f64,
}

/// A fixed-size dimension of a sample (e.g. a spectrum with 512 bins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub size: usize,
}

/// Immutable description of a value or domain encoding.
///
/// Readers compare descriptors by handle identity ([`Arc::ptr_eq`]), never by
/// content: publishing a new `Arc` always counts as a change, even when the
/// fields are equal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataDescriptor {
    #[serde(default)]
    pub name: String,
    pub sample_type: SampleType,
    #[serde(default)]
    pub unit: Option<Unit>,
    #[serde(default)]
    pub value_range: Option<ValueRange>,
    #[serde(default)]
    pub rule: DataRule,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub tick_resolution: Option<Ratio>,
    #[serde(default)]
    pub post_scaling: Option<PostScaling>,
    #[serde(default)]
    pub struct_fields: Vec<DataDescriptor>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DataDescriptor {
    pub fn builder(sample_type: SampleType) -> DataDescriptorBuilder {
        DataDescriptorBuilder {
            descriptor: DataDescriptor { sample_type, ..Default::default() },
        }
    }

    /// Type of the bytes actually stored in a packet payload.
    pub fn raw_sample_type(&self) -> SampleType {
        match &self.post_scaling {
            Some(scaling) => scaling.input_type,
            None => self.sample_type,
        }
    }

    fn element_count(&self) -> usize {
        self.dimensions.iter().map(|d| d.size).product::<usize>().max(1)
    }

    /// Size in bytes of one sample as it appears in the payload.
    pub fn raw_sample_size(&self) -> usize {
        let element = match self.raw_sample_type() {
            SampleType::Struct => self.struct_fields.iter().map(|f| f.raw_sample_size()).sum(),
            other => other.size(),
        };
        element * self.element_count()
    }

    /// Whether the descriptor describes one scalar per sample.
    pub fn is_scalar(&self) -> bool {
        self.element_count() == 1 && self.sample_type != SampleType::Struct
    }

    /// Samples per second implied by a linear domain rule: `1 / (delta * resolution)`.
    pub fn sample_rate(&self) -> Result<Ratio> {
        let resolution = self.tick_resolution.ok_or_else(|| {
            ReaderError::invalid_descriptor("domain descriptor has no tick resolution")
        })?;
        let delta = match &self.rule {
            DataRule::Linear { delta: Scalar::Int(d), .. } => *d,
            DataRule::Linear { delta: Scalar::UInt(d), .. } => *d as i64,
            DataRule::Linear { delta: Scalar::Float(d), .. } if d.fract() == 0.0 => *d as i64,
            _ => {
                return Err(ReaderError::incompatible_rates(format!(
                    "domain of '{}' does not use an integral linear rule",
                    self.name
                )));
            }
        };
        Ratio::from_integer(delta)
            .checked_mul(&resolution)
            .and_then(|period| period.recip())
            .filter(|rate| rate.is_positive())
            .ok_or_else(|| ReaderError::incompatible_rates("domain rate is not positive"))
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.sample_type == SampleType::Invalid {
            return Err(ReaderError::invalid_descriptor("sample type is reported as invalid"));
        }
        if let Some(scaling) = &self.post_scaling {
            if scaling.output_type != self.sample_type {
                return Err(ReaderError::invalid_descriptor(format!(
                    "post-scaling output {:?} differs from sample type {:?}",
                    scaling.output_type, self.sample_type
                )));
            }
            if !scaling.input_type.is_numeric() {
                return Err(ReaderError::invalid_descriptor(format!(
                    "post-scaling input {:?} is not numeric",
                    scaling.input_type
                )));
            }
        }
        if self.sample_type == SampleType::Struct {
            if self.struct_fields.is_empty() {
                return Err(ReaderError::invalid_descriptor("struct descriptor has no fields"));
            }
            for field in &self.struct_fields {
                field.validate()?;
            }
        }
        if let Some(resolution) = &self.tick_resolution {
            if !resolution.is_positive() {
                return Err(ReaderError::invalid_descriptor("tick resolution must be positive"));
            }
        }
        Ok(())
    }
}

/// Chained construction of a [`DataDescriptor`].
#[derive(Debug, Clone)]
pub struct DataDescriptorBuilder {
    descriptor: DataDescriptor,
}

impl DataDescriptorBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = name.into();
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.descriptor.unit = Some(unit);
        self
    }

    pub fn value_range(mut self, low: f64, high: f64) -> Self {
        self.descriptor.value_range = Some(ValueRange { low, high });
        self
    }

    pub fn rule(mut self, rule: DataRule) -> Self {
        self.descriptor.rule = rule;
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.descriptor.origin = Some(origin.into());
        self
    }

    pub fn tick_resolution(mut self, resolution: Ratio) -> Self {
        self.descriptor.tick_resolution = Some(resolution);
        self
    }

    pub fn post_scaling(mut self, input_type: SampleType, scale: f64, offset: f64) -> Self {
        self.descriptor.post_scaling = Some(PostScaling {
            input_type,
            output_type: self.descriptor.sample_type,
            scale,
            offset,
        });
        self
    }

    pub fn struct_field(mut self, field: DataDescriptor) -> Self {
        self.descriptor.struct_fields.push(field);
        self
    }

    pub fn dimension(mut self, name: impl Into<String>, size: usize) -> Self {
        self.descriptor.dimensions.push(Dimension { name: name.into(), size });
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.metadata.insert(key.into(), value.into());
        self
    }

    /// Validate and publish the descriptor as a shared handle.
    pub fn build(self) -> Result<Arc<DataDescriptor>> {
        self.descriptor.validate()?;
        Ok(Arc::new(self.descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_from_linear_domain() {
        let domain = DataDescriptor::builder(SampleType::Int64)
            .rule(DataRule::linear(4, 0))
            .tick_resolution(Ratio::new(1, 1000).unwrap())
            .build()
            .unwrap();
        assert_eq!(domain.sample_rate().unwrap(), Ratio::from_integer(250));
    }

    #[test]
    fn explicit_domain_has_no_rate() {
        let domain = DataDescriptor::builder(SampleType::Int64)
            .tick_resolution(Ratio::new(1, 1000).unwrap())
            .build()
            .unwrap();
        assert!(matches!(domain.sample_rate(), Err(ReaderError::IncompatibleSampleRates { .. })));
    }

    #[test]
    fn struct_size_sums_fields() {
        let descriptor = DataDescriptor::builder(SampleType::Struct)
            .struct_field(
                DataDescriptor::builder(SampleType::Int32).build().unwrap().as_ref().clone(),
            )
            .struct_field(
                DataDescriptor::builder(SampleType::Float64)
                    .dimension("xyz", 3)
                    .build()
                    .unwrap()
                    .as_ref()
                    .clone(),
            )
            .build()
            .unwrap();
        assert_eq!(descriptor.raw_sample_size(), 4 + 24);
        assert!(!descriptor.is_scalar());
    }

    #[test]
    fn scaled_descriptor_stores_input_type() {
        let descriptor = DataDescriptor::builder(SampleType::Float64)
            .post_scaling(SampleType::Int16, 0.5, 1.0)
            .build()
            .unwrap();
        assert_eq!(descriptor.raw_sample_type(), SampleType::Int16);
        assert_eq!(descriptor.raw_sample_size(), 2);
    }

    #[test]
    fn validation_rejects_broken_descriptors() {
        assert!(DataDescriptor::builder(SampleType::Invalid).build().is_err());
        assert!(DataDescriptor::builder(SampleType::Struct).build().is_err());
        let mut scaled = DataDescriptor::builder(SampleType::Float32)
            .post_scaling(SampleType::Int16, 1.0, 0.0)
            .build()
            .unwrap()
            .as_ref()
            .clone();
        scaled.sample_type = SampleType::Float64;
        assert!(scaled.validate().is_err());
    }

    #[test]
    fn descriptors_load_from_yaml() {
        let yaml = r#"
name: time
sample_type: Int64
unit: { symbol: s, name: second, quantity: time }
rule: !Linear { delta: !Int 1, start: !Int 0 }
origin: "2024-01-01T00:00:00+0000"
tick_resolution: { numerator: 1, denominator: 1000 }
"#;
        let descriptor: DataDescriptor = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(descriptor.sample_rate().unwrap(), Ratio::from_integer(1000));
        assert_eq!(descriptor.unit.unwrap().quantity, "time");
    }
}
