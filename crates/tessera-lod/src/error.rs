use tessera_scene::ModelId;

/// Errors that abort a culling pass. The previous result stays in place.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq)]
pub enum CullError {
    /// The camera or a model matrix is degenerate.
    #[error("{} transform is not invertible", transform_owner(.model))]
    NonInvertibleTransform { model: Option<ModelId> },
}

fn transform_owner(model: &Option<ModelId>) -> String {
    match model {
        Some(id) => format!("model {id}"),
        None => "camera".to_string(),
    }
}
