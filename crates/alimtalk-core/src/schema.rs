/// Arrow schema for the persisted passage collection.
pub mod passages {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    pub const ID: &str = "id";
    pub const TEXT: &str = "text";
    pub const EMBEDDING: &str = "embedding";

    /// Schema for the passage table: paragraph id, text, fixed-width embedding.
    pub fn passage_schema(dim: i32) -> Schema {
        Schema::new(vec![
            Field::new(ID, DataType::UInt32, false),
            Field::new(TEXT, DataType::Utf8, false),
            Field::new(
                EMBEDDING,
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
                true,
            ),
        ])
    }
}
