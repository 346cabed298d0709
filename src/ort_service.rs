use crate::{
    config::ModelConfig,
    model_service::{ClassPrediction, InferenceError, ModelService},
};
use async_trait::async_trait;
use image::imageops::FilterType;
use ndarray::{Array, ArrayD, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

const INPUT_SIZE: u32 = 128;

fn preprocess_image(image_data: &[u8]) -> Result<Array<f32, Ix4>, String> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| format!("Error decoding image: {}", e))?;

    let original_img = image_reader
        .decode()
        .map_err(|e| format!("Error decoding image: {}", e))?;

    let img = original_img
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom)
        .to_rgb8();

    // NHWC, unit-scaled, as the classifier was trained.
    let mut input = Array::zeros((1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        input[[0, y as usize, x as usize, 0]] = (r as f32) / 255.;
        input[[0, y as usize, x as usize, 1]] = (g as f32) / 255.;
        input[[0, y as usize, x as usize, 2]] = (b as f32) / 255.;
    }

    Ok(input)
}

fn top_class(outputs: &ArrayD<f32>) -> Option<(usize, f32)> {
    outputs
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, Box<dyn std::error::Error>> {
        ort::init().commit()?;
        let num_instances = model_config.num_instances;
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!("Created {} ONNX sessions", num_instances);

        Ok(Self {
            counter: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(sessions),
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let session_arc = &self.sessions[index];
        let mut session = session_arc
            .lock()
            .map_err(|e| InferenceError::InferenceFailed(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| InferenceError::InferenceFailed(format!("failed to build tensor: {}", e)))?;

        let input_tensor = ort::inputs![tensor_ref];

        let outputs = session
            .run(input_tensor)
            .map_err(|e| InferenceError::InferenceFailed(format!("inference failed: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::InferenceFailed(format!("failed to extract tensor: {}", e)))?;

        let ix = shape.to_ixdyn();
        let array = ArrayD::from_shape_vec(ix, data.to_vec())
            .map_err(|e| InferenceError::InferenceFailed(format!("invalid tensor shape: {}", e)))?;

        Ok(array)
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, image_data: Vec<u8>) -> Result<ClassPrediction, InferenceError> {
        let input = preprocess_image(&image_data).map_err(InferenceError::InvalidImage)?;

        let outputs = self.run_inference(&input)?;

        let (class_index, probability) = top_class(&outputs).ok_or_else(|| {
            InferenceError::InferenceFailed("model produced no class scores".to_string())
        })?;

        Ok(ClassPrediction {
            class_index,
            probability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use ndarray::{Array, Ix4};
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32, color: Rgb<u8>) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, color);
        let mut image_data: Vec<u8> = Vec::new();
        let mut cursor = Cursor::new(&mut image_data);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        image_data
    }

    #[test]
    fn test_preprocess_image() {
        let image_data = encode_png(100, 100, Rgb([255, 0, 0]));

        let input_array_result = preprocess_image(&image_data);

        assert!(input_array_result.is_ok());

        let input_array: Array<f32, Ix4> = input_array_result.unwrap();

        assert_eq!(input_array.shape(), &[1, 128, 128, 3]);
        assert_eq!(input_array[[0, 0, 0, 0]], 1.0);
        assert_eq!(input_array[[0, 0, 0, 1]], 0.0);
        assert_eq!(input_array[[0, 0, 0, 2]], 0.0);
    }

    #[test]
    fn test_preprocess_image_any_dimensions() {
        let image_data = encode_png(37, 411, Rgb([0, 128, 0]));

        let input_array = preprocess_image(&image_data).unwrap();

        assert_eq!(input_array.shape(), &[1, 128, 128, 3]);
        assert!(input_array.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_preprocess_image_rejects_non_image_bytes() {
        let result = preprocess_image(b"definitely not an image");

        assert!(result.is_err());
    }

    #[test]
    fn test_top_class() {
        let outputs =
            ArrayD::from_shape_vec(vec![1, 5], vec![0.05, 0.1, 0.6, 0.2, 0.05]).unwrap();

        let (class_index, probability) = top_class(&outputs).unwrap();

        assert_eq!(class_index, 2);
        assert_eq!(probability, 0.6);
    }
}
