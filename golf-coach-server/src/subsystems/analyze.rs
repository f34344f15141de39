//! Analyze pipeline: validate → encode → history → prompt → vision → parse → persist.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use golf_coach_core::analysis::parse_analysis;
use golf_coach_core::images::{encode_base64, validate_image, ImageError};
use golf_coach_core::models::{AnnotationContext, NewSwing, SwingImages, SwingPosition};
use golf_coach_core::prompt::build_analysis_prompt;
use golf_coach_core::vision::{VisionBackend, VisionError, VisionImage, VisionRequest};
use golf_coach_core::GolfCoachConfig;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::subsystems::swings;
use crate::subsystems::trace::{RequestTrace, Stage};

/// One uploaded position image, as received.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub position: SwingPosition,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Parsed multipart form for `POST /api/swings/analyze`.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeForm {
    pub uploads: Vec<ImageUpload>,
    pub annotations: AnnotationContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeOutcome {
    pub swing_id: i64,
    pub analysis: String,
    pub rating: Option<i64>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("At least one image is required for analysis")]
    NoImages,

    #[error("{source}")]
    InvalidImage {
        position: SwingPosition,
        #[source]
        source: ImageError,
    },

    #[error("Vision backend unavailable: set ANTHROPIC_API_KEY")]
    VisionUnavailable,

    #[error("Failed to analyze swing: {0}")]
    Vision(#[from] VisionError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AnalyzeError {
    /// True for problems with the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalyzeError::NoImages | AnalyzeError::InvalidImage { .. })
    }
}

/// Run the full pipeline. Every stage is recorded on `trace`.
pub async fn analyze_swing(
    pool: &SqlitePool,
    config: &GolfCoachConfig,
    vision: Option<&dyn VisionBackend>,
    mut form: AnalyzeForm,
    trace: &mut RequestTrace,
) -> Result<AnalyzeOutcome, AnalyzeError> {
    if form.uploads.is_empty() {
        trace.failed(Stage::ValidateImages, AnalyzeError::NoImages.to_string());
        return Err(AnalyzeError::NoImages);
    }
    form.uploads.sort_by_key(|u| u.position);

    let positions: Vec<SwingPosition> = form.uploads.iter().map(|u| u.position).collect();
    tracing::info!(count = positions.len(), positions = ?positions, "Received images for analysis");

    // 1. Validate
    trace.started(Stage::ValidateImages);
    let mut media_types = Vec::with_capacity(form.uploads.len());
    for upload in &form.uploads {
        match validate_image(&upload.bytes, upload.content_type.as_deref(), &config.images) {
            Ok(media_type) => media_types.push(media_type),
            Err(source) => {
                trace.failed(
                    Stage::ValidateImages,
                    format!("{}: {}", upload.position, source),
                );
                return Err(AnalyzeError::InvalidImage {
                    position: upload.position,
                    source,
                });
            }
        }
    }
    trace.completed(
        Stage::ValidateImages,
        serde_json::json!({
            "images": form.uploads.len(),
            "sizes": form.uploads.iter().map(|u| u.bytes.len()).collect::<Vec<_>>(),
        }),
    );

    // 2. Encode
    trace.started(Stage::EncodeImages);
    let mut images = SwingImages::new();
    let mut vision_images = Vec::with_capacity(form.uploads.len());
    for (upload, media_type) in form.uploads.iter().zip(media_types) {
        let data = encode_base64(&upload.bytes);
        images.insert(upload.position, data.clone());
        vision_images.push(VisionImage {
            position: upload.position,
            media_type,
            data,
        });
    }
    trace.completed(
        Stage::EncodeImages,
        serde_json::json!({
            "media_types": vision_images.iter().map(|i| i.media_type.as_str()).collect::<Vec<_>>(),
        }),
    );

    // 3. History
    trace.started(Stage::FetchHistory);
    let history = match swings::recent_history(pool, config.history.prompt_context as i64).await {
        Ok(h) => h,
        Err(e) => {
            trace.failed(Stage::FetchHistory, e.to_string());
            return Err(e.into());
        }
    };
    trace.completed(Stage::FetchHistory, serde_json::json!({ "swings": history.len() }));

    // 4. Prompt
    trace.started(Stage::BuildPrompt);
    let prompt = build_analysis_prompt(&positions, &form.annotations, &history);
    trace.completed(
        Stage::BuildPrompt,
        serde_json::json!({
            "prompt_chars": prompt.len(),
            "has_annotations": !form.annotations.is_empty(),
        }),
    );

    // 5. Vision
    trace.started(Stage::CallVision);
    let vision = match vision {
        Some(v) => v,
        None => {
            trace.failed(Stage::CallVision, AnalyzeError::VisionUnavailable.to_string());
            return Err(AnalyzeError::VisionUnavailable);
        }
    };
    let request = VisionRequest {
        images: vision_images,
        prompt,
    };
    let analysis = match vision.analyze(&request).await {
        Ok(text) => text,
        Err(e) => {
            trace.failed(Stage::CallVision, e.to_string());
            return Err(e.into());
        }
    };
    trace.completed(
        Stage::CallVision,
        serde_json::json!({ "backend": vision.name(), "response_chars": analysis.len() }),
    );

    // 6. Parse
    trace.started(Stage::ParseResponse);
    let (rating, summary) = parse_analysis(&analysis);
    tracing::info!(
        rating = ?rating,
        summary_chars = summary.as_ref().map(|s| s.len()).unwrap_or(0),
        "Parsed analysis"
    );
    trace.completed(
        Stage::ParseResponse,
        serde_json::json!({ "rating": rating, "has_summary": summary.is_some() }),
    );

    // 7. Persist
    trace.started(Stage::PersistSwing);
    let new_swing = NewSwing {
        images,
        positions,
        analysis,
        summary,
        rating,
        annotations: form.annotations,
    };
    let swing = match swings::create_swing(pool, &new_swing).await {
        Ok(s) => s,
        Err(e) => {
            trace.failed(Stage::PersistSwing, e.to_string());
            return Err(e.into());
        }
    };
    trace.completed(Stage::PersistSwing, serde_json::json!({ "swing_id": swing.id }));

    Ok(AnalyzeOutcome {
        swing_id: swing.id,
        analysis: swing.analysis,
        rating: swing.rating,
        summary: swing.summary,
        created_at: swing.created_at,
        message: "Swing analyzed successfully".to_string(),
    })
}
