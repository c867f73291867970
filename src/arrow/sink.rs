//! Arrow implementation of RowSink for direct transcoding.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, FixedSizeListArray, Float32Builder, Float64Builder, Int16Builder,
    Int32Builder, Int64Builder, Int8Builder, RecordBatch, StringBuilder, StructArray,
    UInt16Builder, UInt32Builder, UInt64Builder, UInt8Builder,
};
use arrow::datatypes::{DataType, FieldRef, Fields, Schema};
use arrow::record_batch::RecordBatchOptions;
use thiserror::Error;

use crate::sink::RowSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("navigation error: {0}")]
    Navigation(String),

    #[error("unsupported data type: {0}")]
    UnsupportedType(DataType),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

/// Recursive builder for the closed set of target types.
enum Builder {
    Bool(BooleanBuilder),
    Int8(Int8Builder),
    Int16(Int16Builder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    UInt8(UInt8Builder),
    UInt16(UInt16Builder),
    UInt32(UInt32Builder),
    UInt64(UInt64Builder),
    Float32(Float32Builder),
    Float64(Float64Builder),
    String(StringBuilder),
    FixedSizeList(FixedSizeListState),
    Struct(StructState),
}

/// State for building a fixed-size list.
struct FixedSizeListState {
    /// The element builder
    element: Box<Builder>,
    /// Element field, shared with the schema
    item: FieldRef,
    /// Fixed size of each list
    size: usize,
}

/// State for building a struct.
struct StructState {
    /// Child builders, one per field
    children: Vec<Builder>,
    /// Field definitions
    fields: Fields,
    /// Completed structs
    len: usize,
}

impl Builder {
    fn new(data_type: &DataType) -> Result<Self, SinkError> {
        match data_type {
            DataType::Boolean => Ok(Builder::Bool(BooleanBuilder::new())),
            DataType::Int8 => Ok(Builder::Int8(Int8Builder::new())),
            DataType::Int16 => Ok(Builder::Int16(Int16Builder::new())),
            DataType::Int32 => Ok(Builder::Int32(Int32Builder::new())),
            DataType::Int64 => Ok(Builder::Int64(Int64Builder::new())),
            DataType::UInt8 => Ok(Builder::UInt8(UInt8Builder::new())),
            DataType::UInt16 => Ok(Builder::UInt16(UInt16Builder::new())),
            DataType::UInt32 => Ok(Builder::UInt32(UInt32Builder::new())),
            DataType::UInt64 => Ok(Builder::UInt64(UInt64Builder::new())),
            DataType::Float32 => Ok(Builder::Float32(Float32Builder::new())),
            DataType::Float64 => Ok(Builder::Float64(Float64Builder::new())),
            DataType::Utf8 => Ok(Builder::String(StringBuilder::new())),
            DataType::FixedSizeList(item, size) => {
                let element = Box::new(Builder::new(item.data_type())?);
                Ok(Builder::FixedSizeList(FixedSizeListState {
                    element,
                    item: item.clone(),
                    size: *size as usize,
                }))
            }
            DataType::Struct(fields) => {
                let children = fields
                    .iter()
                    .map(|f| Builder::new(f.data_type()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Builder::Struct(StructState {
                    children,
                    fields: fields.clone(),
                    len: 0,
                }))
            }
            other => Err(SinkError::UnsupportedType(other.clone())),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Builder::Bool(_) => "bool",
            Builder::Int8(_) => "i8",
            Builder::Int16(_) => "i16",
            Builder::Int32(_) => "i32",
            Builder::Int64(_) => "i64",
            Builder::UInt8(_) => "u8",
            Builder::UInt16(_) => "u16",
            Builder::UInt32(_) => "u32",
            Builder::UInt64(_) => "u64",
            Builder::Float32(_) => "f32",
            Builder::Float64(_) => "f64",
            Builder::String(_) => "string",
            Builder::FixedSizeList(_) => "fixed_list",
            Builder::Struct(_) => "struct",
        }
    }

    fn finish(&mut self) -> Result<ArrayRef, SinkError> {
        let array: ArrayRef = match self {
            Builder::Bool(b) => Arc::new(b.finish()),
            Builder::Int8(b) => Arc::new(b.finish()),
            Builder::Int16(b) => Arc::new(b.finish()),
            Builder::Int32(b) => Arc::new(b.finish()),
            Builder::Int64(b) => Arc::new(b.finish()),
            Builder::UInt8(b) => Arc::new(b.finish()),
            Builder::UInt16(b) => Arc::new(b.finish()),
            Builder::UInt32(b) => Arc::new(b.finish()),
            Builder::UInt64(b) => Arc::new(b.finish()),
            Builder::Float32(b) => Arc::new(b.finish()),
            Builder::Float64(b) => Arc::new(b.finish()),
            Builder::String(b) => Arc::new(b.finish()),
            Builder::FixedSizeList(state) => {
                let values = state.element.finish()?;
                Arc::new(FixedSizeListArray::try_new(
                    state.item.clone(),
                    state.size as i32,
                    values,
                    None,
                )?)
            }
            Builder::Struct(state) => {
                let arrays = state
                    .children
                    .iter_mut()
                    .map(|c| c.finish())
                    .collect::<Result<Vec<_>, _>>()?;
                let len = std::mem::take(&mut state.len);
                if state.fields.is_empty() {
                    Arc::new(StructArray::new_empty_fields(len, None))
                } else {
                    Arc::new(StructArray::try_new(state.fields.clone(), arrays, None)?)
                }
            }
        };
        Ok(array)
    }
}

/// Navigation frame below the top level.
enum Frame {
    /// Inside a struct, at the given child.
    Struct { child: usize },
    /// Inside a fixed-size list, after `pushed` elements.
    List { pushed: usize },
}

/// Arrow implementation of RowSink.
///
/// Rows accumulate in column builders until `finish` turns them into a
/// `RecordBatch`; the sink is then ready for the next batch.
pub struct ArrowRowSink {
    schema: Arc<Schema>,
    builders: Vec<Builder>,
    /// Stack of frames for nested navigation
    frames: Vec<Frame>,
    /// Current field index at top level
    current_field: usize,
    /// Completed rows in the pending batch
    row_count: usize,
}

impl ArrowRowSink {
    /// Create a new sink for the given Arrow schema.
    pub fn new(schema: Arc<Schema>) -> Result<Self, SinkError> {
        let builders = schema
            .fields()
            .iter()
            .map(|f| Builder::new(f.data_type()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            schema,
            builders,
            frames: Vec::new(),
            current_field: 0,
            row_count: 0,
        })
    }

    pub fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    /// Number of completed rows not yet returned by `finish`.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Finish building and return the pending rows as a RecordBatch.
    pub fn finish(&mut self) -> Result<RecordBatch, SinkError> {
        if !self.frames.is_empty() || self.current_field != 0 {
            return Err(SinkError::Navigation("finish called inside a row".into()));
        }

        let arrays = self
            .builders
            .iter_mut()
            .map(|b| b.finish())
            .collect::<Result<Vec<_>, _>>()?;
        let row_count = std::mem::take(&mut self.row_count);

        // Row count must be explicit for schemas without fields.
        let options = RecordBatchOptions::new().with_row_count(Some(row_count));
        Ok(RecordBatch::try_new_with_options(
            self.schema.clone(),
            arrays,
            &options,
        )?)
    }

    /// Resolve the builder the next push goes to.
    fn current_builder(&mut self) -> Result<&mut Builder, SinkError> {
        let field_count = self.builders.len();
        let mut node = self.builders.get_mut(self.current_field).ok_or_else(|| {
            SinkError::Navigation(format!(
                "field {} out of bounds (have {})",
                self.current_field, field_count
            ))
        })?;

        for frame in &self.frames {
            node = match (node, frame) {
                (Builder::Struct(state), Frame::Struct { child }) => {
                    let count = state.children.len();
                    state.children.get_mut(*child).ok_or_else(|| {
                        SinkError::Navigation(format!(
                            "struct child {} out of bounds (have {})",
                            child, count
                        ))
                    })?
                }
                (Builder::FixedSizeList(state), Frame::List { pushed }) => {
                    if *pushed >= state.size {
                        return Err(SinkError::Navigation(format!(
                            "fixed-size list of {} overflowed",
                            state.size
                        )));
                    }
                    state.element.as_mut()
                }
                (other, _) => {
                    return Err(SinkError::Navigation(format!(
                        "frame does not match {} builder",
                        other.type_name()
                    )))
                }
            };
        }
        Ok(node)
    }

    fn advance(&mut self) {
        match self.frames.last_mut() {
            None => self.current_field += 1,
            Some(Frame::Struct { child }) => *child += 1,
            Some(Frame::List { pushed }) => *pushed += 1,
        }
    }
}

macro_rules! push_primitive {
    ($method:ident, $ty:ty, $variant:ident, $name:literal) => {
        fn $method(&mut self, value: $ty) -> Result<(), Self::Error> {
            match self.current_builder()? {
                Builder::$variant(b) => b.append_value(value),
                other => {
                    return Err(SinkError::TypeMismatch {
                        expected: other.type_name().into(),
                        got: $name.into(),
                    })
                }
            }
            self.advance();
            Ok(())
        }
    };
}

impl RowSink for ArrowRowSink {
    type Error = SinkError;

    push_primitive!(push_bool, bool, Bool, "bool");
    push_primitive!(push_i8, i8, Int8, "i8");
    push_primitive!(push_i16, i16, Int16, "i16");
    push_primitive!(push_i32, i32, Int32, "i32");
    push_primitive!(push_i64, i64, Int64, "i64");
    push_primitive!(push_u8, u8, UInt8, "u8");
    push_primitive!(push_u16, u16, UInt16, "u16");
    push_primitive!(push_u32, u32, UInt32, "u32");
    push_primitive!(push_u64, u64, UInt64, "u64");
    push_primitive!(push_f32, f32, Float32, "f32");
    push_primitive!(push_f64, f64, Float64, "f64");
    push_primitive!(push_string, &str, String, "string");

    fn push_i8_array(&mut self, values: &[i8]) -> Result<(), Self::Error> {
        match self.current_builder()? {
            Builder::FixedSizeList(state) if state.size == values.len() => {
                match state.element.as_mut() {
                    Builder::Int8(b) => b.append_slice(values),
                    other => {
                        return Err(SinkError::TypeMismatch {
                            expected: format!("{} elements", other.type_name()),
                            got: "i8 elements".into(),
                        })
                    }
                }
            }
            other => {
                return Err(SinkError::TypeMismatch {
                    expected: other.type_name().into(),
                    got: format!("i8[{}]", values.len()),
                })
            }
        }
        self.advance();
        Ok(())
    }

    fn enter_struct(&mut self) -> Result<(), Self::Error> {
        match self.current_builder()? {
            Builder::Struct(_) => {}
            other => {
                return Err(SinkError::TypeMismatch {
                    expected: other.type_name().into(),
                    got: "struct".into(),
                })
            }
        }
        self.frames.push(Frame::Struct { child: 0 });
        Ok(())
    }

    fn exit_struct(&mut self) -> Result<(), Self::Error> {
        let child = match self.frames.pop() {
            Some(Frame::Struct { child }) => child,
            _ => return Err(SinkError::Navigation("exit_struct outside struct".into())),
        };
        match self.current_builder()? {
            Builder::Struct(state) if state.children.len() == child => state.len += 1,
            Builder::Struct(state) => {
                return Err(SinkError::Navigation(format!(
                    "struct exited after {} of {} fields",
                    child,
                    state.children.len()
                )))
            }
            other => {
                return Err(SinkError::Navigation(format!(
                    "exit_struct on {} builder",
                    other.type_name()
                )))
            }
        }
        self.advance();
        Ok(())
    }

    fn enter_list(&mut self, len: usize) -> Result<(), Self::Error> {
        match self.current_builder()? {
            Builder::FixedSizeList(state) if state.size == len => {}
            other => {
                return Err(SinkError::TypeMismatch {
                    expected: other.type_name().into(),
                    got: format!("list of {}", len),
                })
            }
        }
        self.frames.push(Frame::List { pushed: 0 });
        Ok(())
    }

    fn exit_list(&mut self) -> Result<(), Self::Error> {
        let pushed = match self.frames.pop() {
            Some(Frame::List { pushed }) => pushed,
            _ => return Err(SinkError::Navigation("exit_list outside list".into())),
        };
        match self.current_builder()? {
            Builder::FixedSizeList(state) if state.size == pushed => {}
            Builder::FixedSizeList(state) => {
                return Err(SinkError::Navigation(format!(
                    "list exited after {} of {} elements",
                    pushed, state.size
                )))
            }
            other => {
                return Err(SinkError::Navigation(format!(
                    "exit_list on {} builder",
                    other.type_name()
                )))
            }
        }
        self.advance();
        Ok(())
    }

    fn finish_row(&mut self) -> Result<(), Self::Error> {
        if !self.frames.is_empty() {
            return Err(SinkError::Navigation("row finished inside nested field".into()));
        }
        if self.current_field != self.builders.len() {
            return Err(SinkError::Navigation(format!(
                "row finished after {} of {} fields",
                self.current_field,
                self.builders.len()
            )));
        }
        self.current_field = 0;
        self.row_count += 1;
        Ok(())
    }
}
