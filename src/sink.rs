//! Generic row sink trait for schema-driven transcoding.
//!
//! The `RowSink` trait is the receiving end of the entry transcoder: values
//! are pushed in schema order, and the sink implementation (Arrow record
//! batches) handles the actual storage.

/// A sink that receives row data in schema order.
///
/// Implementations track their position internally. Values are pushed
/// in the order defined by the schema, with `enter_*`/`exit_*` calls
/// around fixed arrays and records.
///
/// # Example flow for a row `{ n: 3, pos: [1.0, 2.0], hit: { a: 1, b: 2 } }`:
/// ```ignore
/// sink.push_i32(3);         // n
/// sink.enter_list(2)?;      // pos
/// sink.push_f64(1.0);
/// sink.push_f64(2.0);
/// sink.exit_list()?;
/// sink.enter_struct()?;     // hit
/// sink.push_i32(1);         // hit.a
/// sink.push_i32(2);         // hit.b
/// sink.exit_struct()?;
/// sink.finish_row()?;
/// ```
pub trait RowSink {
    type Error;

    // Primitive types
    fn push_bool(&mut self, value: bool) -> Result<(), Self::Error>;
    fn push_i8(&mut self, value: i8) -> Result<(), Self::Error>;
    fn push_i16(&mut self, value: i16) -> Result<(), Self::Error>;
    fn push_i32(&mut self, value: i32) -> Result<(), Self::Error>;
    fn push_i64(&mut self, value: i64) -> Result<(), Self::Error>;
    fn push_u8(&mut self, value: u8) -> Result<(), Self::Error>;
    fn push_u16(&mut self, value: u16) -> Result<(), Self::Error>;
    fn push_u32(&mut self, value: u32) -> Result<(), Self::Error>;
    fn push_u64(&mut self, value: u64) -> Result<(), Self::Error>;
    fn push_f32(&mut self, value: f32) -> Result<(), Self::Error>;
    fn push_f64(&mut self, value: f64) -> Result<(), Self::Error>;
    fn push_string(&mut self, value: &str) -> Result<(), Self::Error>;

    /// Push a whole fixed array of i8 (character arrays).
    /// Default implementation falls back to element-by-element pushing.
    fn push_i8_array(&mut self, values: &[i8]) -> Result<(), Self::Error> {
        self.enter_list(values.len())?;
        for &v in values {
            self.push_i8(v)?;
        }
        self.exit_list()
    }

    // Nested structure navigation

    /// Enter a record field. Subsequent pushes go to its sub-fields.
    fn enter_struct(&mut self) -> Result<(), Self::Error>;

    /// Exit the current record, returning to the parent context.
    fn exit_struct(&mut self) -> Result<(), Self::Error>;

    /// Enter a fixed array field with the given length.
    /// Subsequent pushes go to its elements.
    fn enter_list(&mut self, len: usize) -> Result<(), Self::Error>;

    /// Exit the current array, returning to the parent context.
    fn exit_list(&mut self) -> Result<(), Self::Error>;

    /// Complete the current row. Resets position for the next row.
    fn finish_row(&mut self) -> Result<(), Self::Error>;
}
