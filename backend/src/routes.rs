use std::path::{Component, Path, PathBuf};

use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use shared::{
    DetectionResponse, HealthResponse, PestPredictionRequest, PredictionResponse,
    WeekPredictionRequest,
};

use crate::detection::aggregate::{aggregate, DetectionReport};
use crate::error::ApiError;
use crate::models::Models;
use crate::prediction::tabular::{parse_features, predict_pest};
use crate::prediction::weekly::{is_valid_week, parse_week, predict_week, FIRST_WEEK, LAST_WEEK};
use crate::storage::upload_store::UploadStore;
use crate::taxonomy::Catalog;

const IMAGE_FIELD: &str = "image";

/// Directory served under `/runs`.
#[derive(Debug, Clone)]
pub struct RunsRoot(pub PathBuf);

pub fn configure_routes(cfg: &mut web::ServiceConfig, runs_dir: PathBuf) {
    cfg.app_data(web::Data::new(RunsRoot(runs_dir.clone())))
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            ApiError::BadRequest(format!("Invalid JSON body: {}", err)).into()
        }))
        .service(web::resource("/api/pestwatch_yolo").route(web::post().to(handle_detection)))
        .service(web::resource("/api/pestpred").route(web::post().to(handle_pest_prediction)))
        .service(
            web::resource("/api/predict_week").route(web::post().to(handle_week_prediction)),
        )
        .service(web::resource("/api/health").route(web::get().to(health)))
        .service(Files::new("/runs", runs_dir));
}

/// Converts an annotated image path into the URL it is served under.
pub fn web_path(annotated: &Path, runs_root: &Path) -> String {
    if let Ok(relative) = annotated.strip_prefix(runs_root) {
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        return format!("/runs/{}", parts.join("/"));
    }

    let relative = annotated.to_string_lossy().replace('\\', "/");
    if relative.starts_with('/') {
        relative
    } else {
        format!("/{}", relative)
    }
}

async fn read_image_field(
    payload: &mut Multipart,
    max_bytes: usize,
) -> Result<Option<(String, Vec<u8>)>, ApiError> {
    let mut upload = None;

    loop {
        let mut field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart upload: {}", e);
                break;
            }
        };

        let (name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().map(str::to_owned),
                cd.get_filename().map(str::to_owned),
            ),
            None => (None, None),
        };

        if upload.is_some() || name.as_deref() != Some(IMAGE_FIELD) {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| ApiError::BadRequest(format!("Malformed upload: {}", e)))?;
            }
            continue;
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| ApiError::BadRequest(format!("Malformed upload: {}", e)))?;
            if data.len() + chunk.len() > max_bytes {
                return Err(ApiError::PayloadTooLarge(format!(
                    "File too large (limit is {} bytes)",
                    max_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }
        upload = Some((filename.unwrap_or_default(), data));
    }

    Ok(upload)
}

async fn handle_detection(
    models: web::Data<Models>,
    catalog: web::Data<Catalog>,
    uploads: web::Data<UploadStore>,
    runs: web::Data<RunsRoot>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let Some((filename, data)) = read_image_field(&mut payload, uploads.max_bytes()).await?
    else {
        return Err(ApiError::BadRequest("No image provided".into()));
    };

    let safe_name = uploads.accept_filename(&filename)?;
    let image_path = uploads.save(&safe_name, &data).await?;
    info!("Saved upload {} ({} bytes)", image_path.display(), data.len());

    let detector = models.detector.clone();
    let detect_path = image_path.clone();
    let outcome = web::block(move || detector.detect(&detect_path))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let report = match outcome {
        Ok(output) => {
            let output_dir = output.output_dir;
            aggregate(&output.detections, &catalog.detector, &image_path, move || {
                output_dir
            })
        }
        Err(e) => {
            error!("Detection failed for {}: {}", image_path.display(), e);
            DetectionReport::failure(&e)
        }
    };

    info!("Detection: {}", report.summary_message);
    info!("Suggestion: {}", report.suggestion_message);

    Ok(HttpResponse::Ok().json(DetectionResponse {
        pest_class: report.summary_message,
        suggestion: report.suggestion_message,
        annotated_image: report
            .annotated_image_path
            .as_deref()
            .map(|p| web_path(p, &runs.0)),
    }))
}

async fn handle_pest_prediction(
    models: web::Data<Models>,
    catalog: web::Data<Catalog>,
    body: web::Json<PestPredictionRequest>,
) -> Result<HttpResponse, ApiError> {
    let features = parse_features(body.features())?;

    let classifier = models.tabular.clone();
    let catalog = catalog.into_inner();
    let prediction =
        web::block(move || predict_pest(features, classifier.as_ref(), &catalog.tabular))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??;

    info!("Predicted class: {:?}", prediction.pest);
    Ok(HttpResponse::Ok().json(PredictionResponse {
        prediction: prediction.to_literal(),
    }))
}

async fn handle_week_prediction(
    models: web::Data<Models>,
    catalog: web::Data<Catalog>,
    body: web::Json<WeekPredictionRequest>,
) -> Result<HttpResponse, ApiError> {
    let week = parse_week(body.week.as_ref())?;
    if !is_valid_week(week) {
        return Err(ApiError::BadRequest(format!(
            "Week number must be between {} and {}",
            FIRST_WEEK, LAST_WEEK
        )));
    }

    let classifier = models.weekly.clone();
    let catalog = catalog.into_inner();
    let prediction =
        web::block(move || predict_week(week as u32, classifier.as_ref(), &catalog.weekly))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??;

    info!("Week {} predictions: {:?}", week, prediction.pests);
    Ok(HttpResponse::Ok().json(PredictionResponse {
        prediction: prediction.to_literal(),
    }))
}

async fn health(models: web::Data<Models>) -> HttpResponse {
    let status = if models.all_loaded() { "ok" } else { "degraded" };
    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        models: models.status().clone(),
    })
}
