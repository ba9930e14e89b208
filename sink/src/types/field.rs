use std::fmt;

/// JSON schema type declared for a field, after `null` has been stripped.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DeclaredType {
    String,
    Integer,
    Number,
    Boolean,
    /// A string carrying `format: date-time`.
    Timestamp,
    Object,
    Array,
}

impl DeclaredType {
    /// Parses a JSON schema `type` keyword. Returns `None` for `null` and unknown names.
    pub fn from_json_schema(name: &str) -> Option<DeclaredType> {
        match name {
            "string" => Some(DeclaredType::String),
            "integer" => Some(DeclaredType::Integer),
            "number" => Some(DeclaredType::Number),
            "boolean" => Some(DeclaredType::Boolean),
            "object" => Some(DeclaredType::Object),
            "array" => Some(DeclaredType::Array),
            _ => None,
        }
    }
}

/// JSON schema `format` hint.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum FormatHint {
    DateTime,
    Date,
    Time,
    Uuid,
    Other(String),
}

impl FormatHint {
    pub fn parse(format: &str) -> FormatHint {
        match format {
            "date-time" => FormatHint::DateTime,
            "date" => FormatHint::Date,
            "time" => FormatHint::Time,
            "uuid" => FormatHint::Uuid,
            other => FormatHint::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FormatHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatHint::DateTime => f.write_str("date-time"),
            FormatHint::Date => f.write_str("date"),
            FormatHint::Time => f.write_str("time"),
            FormatHint::Uuid => f.write_str("uuid"),
            FormatHint::Other(other) => f.write_str(other),
        }
    }
}

/// Abstract description of one field of a stream.
///
/// Immutable once it is part of a [`StreamSchema`] revision.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FieldSchema {
    /// Field name as declared by the source, before conforming.
    pub name: String,
    /// `None` when the type is absent or cannot be interpreted.
    pub declared_type: Option<DeclaredType>,
    pub format: Option<FormatHint>,
    pub nullable: bool,
    /// Listed in the stream's `required` properties.
    pub required: bool,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub max_length: Option<u32>,
    /// Nested properties of object fields.
    pub properties: Vec<FieldSchema>,
}

impl FieldSchema {
    /// Creates a nullable, optional field of the given type.
    pub fn new(name: impl Into<String>, declared_type: Option<DeclaredType>) -> FieldSchema {
        FieldSchema {
            name: name.into(),
            declared_type,
            format: None,
            nullable: true,
            required: false,
            minimum: None,
            maximum: None,
            max_length: None,
            properties: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: FormatHint) -> FieldSchema {
        self.format = Some(format);
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> FieldSchema {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_range(mut self, minimum: Option<i64>, maximum: Option<i64>) -> FieldSchema {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_properties(mut self, properties: Vec<FieldSchema>) -> FieldSchema {
        self.properties = properties;
        self
    }

    pub fn not_null(mut self) -> FieldSchema {
        self.nullable = false;
        self
    }

    pub fn required(mut self) -> FieldSchema {
        self.required = true;
        self
    }

    /// Returns `true` for objects whose properties are known and can be flattened.
    pub fn has_properties(&self) -> bool {
        self.declared_type == Some(DeclaredType::Object) && !self.properties.is_empty()
    }
}

/// One revision of the declared shape of a stream.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StreamSchema {
    pub stream: String,
    pub fields: Vec<FieldSchema>,
    /// Declared key properties, in declaration order and unconformed.
    pub key_properties: Vec<String>,
    /// Starts at 1 and increases with every schema message of the stream.
    pub revision: u64,
}

impl StreamSchema {
    pub fn new(
        stream: impl Into<String>,
        fields: Vec<FieldSchema>,
        key_properties: Vec<String>,
    ) -> StreamSchema {
        StreamSchema {
            stream: stream.into(),
            fields,
            key_properties,
            revision: 1,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn has_keys(&self) -> bool {
        !self.key_properties.is_empty()
    }
}
