//! Fixed-size, participant-owned value buffers.

use indexmap::IndexMap;

/// Values of one field over the participant's vertices, vertex-major.
///
/// The length is fixed at `vertex_count × width` when the buffer is
/// created.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldBuffer {
    values: Vec<f64>,
}

impl FieldBuffer {
    /// A zero-filled buffer.
    pub fn new(vertex_count: usize, width: usize) -> Self {
        Self::filled(vertex_count, width, 0.0)
    }

    /// A buffer with every value set to `value`.
    pub fn filled(vertex_count: usize, width: usize, value: f64) -> Self {
        Self {
            values: vec![value; vertex_count * width],
        }
    }

    /// Total number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the buffer holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The values, vertex-major.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable access to the values. The length cannot change.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Set every value to `value`.
    pub fn fill(&mut self, value: f64) {
        self.values.fill(value);
    }
}

/// Field buffers of one participant keyed by field name, in registration
/// order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldBuffers {
    fields: IndexMap<String, FieldBuffer>,
}

impl FieldBuffers {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field.
    pub fn insert(&mut self, name: impl Into<String>, buffer: FieldBuffer) {
        self.fields.insert(name.into(), buffer);
    }

    /// Look up a field.
    pub fn get(&self, name: &str) -> Option<&FieldBuffer> {
        self.fields.get(name)
    }

    /// Look up a field for writing.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldBuffer> {
        self.fields.get_mut(name)
    }

    /// `(name, buffer)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldBuffer)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is present.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_vertices_times_width() {
        let b = FieldBuffer::new(4, 3);
        assert_eq!(b.len(), 12);
        assert!(b.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn fill_keeps_length() {
        let mut b = FieldBuffer::filled(1, 3, 0.5);
        assert_eq!(b.values(), &[0.5, 0.5, 0.5]);
        b.fill(2.0);
        assert_eq!(b.values(), &[2.0, 2.0, 2.0]);
        b.values_mut()[1] = 1.0;
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn fields_keep_registration_order() {
        let mut set = FieldBuffers::new();
        set.insert("Velocities", FieldBuffer::new(1, 3));
        set.insert("Forces", FieldBuffer::new(1, 3));
        let names: Vec<&str> = set.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["Velocities", "Forces"]);
        assert_eq!(set.len(), 2);
        assert!(set.get("Forces").is_some());
        assert!(set.get("Pressure").is_none());
    }

    #[test]
    fn zero_width_buffer_has_no_vertices() {
        let b = FieldBuffer::new(5, 0);
        assert!(b.is_empty());
        assert_eq!(b.len(), 0);
    }
}
