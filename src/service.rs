use crate::appointment::{
    AppointmentError, AppointmentForm, AppointmentRequest, Attachment, ProviderDirectory,
    TimeSlot, compose,
};
use crate::classifier::{ModelError, ScoreModel, Verdict, classify};
use crate::facilities::{ListingError, load_facilities, render};
use crate::notify::{DeliveryError, NotificationService};
use crate::upload::{self, UploadError, UploadedImage};
use std::path::PathBuf;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

pub mod pb {
    tonic::include_proto!("tumor_screening");
    pub(crate) const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("tumor_screening_descriptor");
}

use pb::scan_request::ImageSource;
use pb::screening_server::Screening;
use pb::{
    BookAppointmentRequest, BookAppointmentResponse, Facility, ListFacilitiesRequest,
    ListFacilitiesResponse, ListProvidersRequest, ListProvidersResponse, Provider, ScanRequest,
    ScanVerdict,
};

impl From<UploadError> for Status {
    fn from(e: UploadError) -> Self {
        warn!(error = %e, "rejected scan");
        Status::invalid_argument(e.to_string())
    }
}

impl From<ModelError> for Status {
    fn from(e: ModelError) -> Self {
        error!(error = %e, "classifier failed");
        Status::internal(format!("classification failed: {e}"))
    }
}

impl From<AppointmentError> for Status {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::UnknownProvider(_) => Status::not_found(e.to_string()),
            _ => Status::invalid_argument(e.to_string()),
        }
    }
}

impl From<DeliveryError> for Status {
    fn from(e: DeliveryError) -> Self {
        Status::unavailable(format!("delivery failed: {e}"))
    }
}

impl From<ListingError> for Status {
    fn from(e: ListingError) -> Self {
        error!(error = %e, "facility listing failed");
        Status::failed_precondition(e.to_string())
    }
}

impl From<Verdict> for pb::Verdict {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::NoTumorDetected => pb::Verdict::NoTumorDetected,
            Verdict::TumorDetected => pb::Verdict::TumorDetected,
        }
    }
}

fn declared_format(format: pb::ImageFormat) -> Option<image::ImageFormat> {
    match format {
        pb::ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
        pb::ImageFormat::Png => Some(image::ImageFormat::Png),
        pb::ImageFormat::Unspecified => None,
    }
}

pub struct ScreeningService {
    model: Arc<dyn ScoreModel>,
    http: reqwest::Client,
    providers: ProviderDirectory,
    notifier: NotificationService,
    facilities_csv: PathBuf,
}

impl ScreeningService {
    pub fn new(
        model: Arc<dyn ScoreModel>,
        http: reqwest::Client,
        providers: ProviderDirectory,
        notifier: NotificationService,
        facilities_csv: PathBuf,
    ) -> Self {
        Self {
            model,
            http,
            providers,
            notifier,
            facilities_csv,
        }
    }
}

#[tonic::async_trait]
impl Screening for ScreeningService {
    async fn detect_tumor(
        &self,
        request: Request<ScanRequest>,
    ) -> Result<Response<ScanVerdict>, Status> {
        let request_inner = request.into_inner();
        let request_id = request_inner.request_id.clone();
        let format = declared_format(request_inner.format());

        let upload = match request_inner.image_source {
            Some(ImageSource::ImageData(bytes)) => UploadedImage { bytes, format },
            Some(ImageSource::ImageUrl(url)) => upload::fetch(&self.http, &url, format).await?,
            None => return Err(UploadError::Missing.into()),
        };
        info!(%request_id, bytes = upload.bytes.len(), "classifying scan");

        // Decoding and inference are CPU bound.
        let model = Arc::clone(&self.model);
        let verdict = tokio::task::spawn_blocking(move || -> Result<Verdict, Status> {
            let image = upload.decode()?;
            Ok(classify(model.as_ref(), &image)?)
        })
        .await
        .map_err(|e| Status::internal(format!("classification task failed: {e}")))??;

        info!(%request_id, ?verdict, "scan classified");
        Ok(Response::new(ScanVerdict {
            request_id,
            verdict: pb::Verdict::from(verdict) as i32,
            advice: verdict.advice().to_string(),
            model_version: self.model.version().to_string(),
        }))
    }

    async fn list_providers(
        &self,
        _request: Request<ListProvidersRequest>,
    ) -> Result<Response<ListProvidersResponse>, Status> {
        let providers = self
            .providers
            .all()
            .iter()
            .map(|p| Provider {
                name: p.name.to_string(),
                specialization: p.specialization.to_string(),
                contact_phone: p.phone.to_string(),
            })
            .collect();
        let time_slots = TimeSlot::ALL.iter().map(|s| s.label().to_string()).collect();
        Ok(Response::new(ListProvidersResponse {
            providers,
            time_slots,
        }))
    }

    async fn book_appointment(
        &self,
        request: Request<BookAppointmentRequest>,
    ) -> Result<Response<BookAppointmentResponse>, Status> {
        let req = request.into_inner();
        let provider = self.providers.find(&req.provider_name)?;

        let form = AppointmentForm {
            name: req.name,
            email: req.email,
            phone: req.phone,
            city: req.city,
            state: req.state,
            country: req.country,
            preferred_date: req.preferred_date,
            time_slot: req.time_slot,
            message: req.message,
            attachments: req
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    filename: a.filename,
                    content_type: a.content_type,
                    data: a.data,
                })
                .collect(),
        };
        let appointment = AppointmentRequest::try_from(form)?;
        info!(
            provider = provider.name,
            slot = %appointment.time_slot,
            attachments = appointment.attachments.len(),
            "booking appointment"
        );

        let pair = compose(&appointment, provider);
        let report = self.notifier.send_pair(&pair).await?;

        let reply = match report.confirmation {
            Ok(()) => BookAppointmentResponse {
                provider_notified: true,
                confirmation_sent: true,
                detail: "Appointment request sent! You will receive a confirmation email shortly."
                    .to_string(),
            },
            Err(e) => BookAppointmentResponse {
                provider_notified: true,
                confirmation_sent: false,
                detail: format!(
                    "Appointment request sent to {}, but the confirmation email could not be delivered: {e}",
                    provider.name
                ),
            },
        };
        Ok(Response::new(reply))
    }

    async fn list_facilities(
        &self,
        _request: Request<ListFacilitiesRequest>,
    ) -> Result<Response<ListFacilitiesResponse>, Status> {
        let path = self.facilities_csv.clone();
        let records = tokio::task::spawn_blocking(move || load_facilities(&path))
            .await
            .map_err(|e| Status::internal(format!("listing task failed: {e}")))??;

        let rendered = render(&records);
        let facilities = records
            .into_iter()
            .map(|f| Facility {
                name: f.name,
                location: f.location,
                contact: f.contact,
                speciality: f.speciality,
                free_treatment: f.free_treatment,
            })
            .collect();
        Ok(Response::new(ListFacilitiesResponse {
            facilities,
            rendered,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointment::tests::directory;
    use crate::classifier::tests::FixedScores;
    use crate::notify::tests::RecordingTransport;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::{Cursor, Write};
    use tonic::Code;

    fn service(scores: Vec<f32>, transport: Arc<RecordingTransport>, csv: PathBuf) -> ScreeningService {
        ScreeningService::new(
            Arc::new(FixedScores::new(scores)),
            reqwest::Client::new(),
            directory(),
            NotificationService::new(transport),
            csv,
        )
    }

    fn default_service(scores: Vec<f32>) -> ScreeningService {
        service(
            scores,
            Arc::new(RecordingTransport::default()),
            PathBuf::from("does-not-exist.csv"),
        )
    }

    fn png_scan() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(240, 180, Rgb([90, 90, 90]))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn scan(bytes: Vec<u8>) -> Request<ScanRequest> {
        Request::new(ScanRequest {
            request_id: "scan-1".to_string(),
            image_source: Some(ImageSource::ImageData(bytes)),
            format: pb::ImageFormat::Png as i32,
        })
    }

    fn booking() -> BookAppointmentRequest {
        BookAppointmentRequest {
            provider_name: "Dr. Jane Smith".to_string(),
            name: "Asha Patel".to_string(),
            email: "asha@patient.test".to_string(),
            phone: "+91 98765 43210".to_string(),
            city: "Ahmedabad".to_string(),
            state: "Gujarat".to_string(),
            country: "India".to_string(),
            preferred_date: "2026-11-02".to_string(),
            time_slot: "10:00 AM".to_string(),
            message: String::new(),
            attachments: vec![pb::Attachment {
                filename: "scan.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                data: vec![0xff, 0xd8, 0xff],
            }],
        }
    }

    #[tokio::test]
    async fn detects_tumor_when_class_one_wins() {
        let reply = default_service(vec![0.2, 0.8])
            .detect_tumor(scan(png_scan()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(reply.request_id, "scan-1");
        assert_eq!(reply.verdict(), pb::Verdict::TumorDetected);
        assert!(reply.advice.starts_with("Tumor detected"));
        assert_eq!(reply.model_version, "fixed");
    }

    #[tokio::test]
    async fn reports_no_tumor_when_class_zero_wins() {
        let reply = default_service(vec![0.7, 0.3])
            .detect_tumor(scan(png_scan()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(reply.verdict(), pb::Verdict::NoTumorDetected);
    }

    #[tokio::test]
    async fn corrupt_scan_is_invalid_argument() {
        let status = default_service(vec![0.7, 0.3])
            .detect_tumor(scan(b"GIF89a-truncated".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status = default_service(vec![0.7, 0.3])
            .detect_tumor(Request::new(ScanRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn lists_fixed_providers_and_slots() {
        let reply = default_service(vec![1.0, 0.0])
            .list_providers(Request::new(ListProvidersRequest {}))
            .await
            .unwrap()
            .into_inner();
        let names: Vec<&str> = reply.providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Dr. John Doe", "Dr. Jane Smith", "Dr. Robert Brown"]);
        assert_eq!(reply.time_slots.len(), 6);
        assert_eq!(reply.time_slots[2], "3:00 PM");
    }

    #[tokio::test]
    async fn booking_sends_provider_message_then_confirmation() {
        let transport = Arc::new(RecordingTransport::default());
        let svc = service(vec![1.0, 0.0], transport.clone(), PathBuf::new());

        let reply = svc
            .book_appointment(Request::new(booking()))
            .await
            .unwrap()
            .into_inner();

        assert!(reply.provider_notified && reply.confirmation_sent);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "smith@clinic.test");
        assert_eq!(sent[0].attachments.len(), 1);
        assert_eq!(sent[1].to, "asha@patient.test");
        assert!(sent[1].attachments.is_empty());
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found_and_sends_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let svc = service(vec![1.0, 0.0], transport.clone(), PathBuf::new());
        let mut request = booking();
        request.provider_name = "Dr. House".to_string();

        let status = svc.book_appointment(Request::new(request)).await.unwrap_err();

        assert_eq!(status.code(), Code::NotFound);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn relay_failure_is_unavailable() {
        let transport = Arc::new(RecordingTransport::failing_at(vec![0]));
        let svc = service(vec![1.0, 0.0], transport, PathBuf::new());

        let status = svc.book_appointment(Request::new(booking())).await.unwrap_err();

        assert_eq!(status.code(), Code::Unavailable);
        assert!(status.message().starts_with("delivery failed"));
    }

    #[tokio::test]
    async fn failed_confirmation_is_a_partial_success() {
        let transport = Arc::new(RecordingTransport::failing_at(vec![1]));
        let svc = service(vec![1.0, 0.0], transport, PathBuf::new());

        let reply = svc
            .book_appointment(Request::new(booking()))
            .await
            .unwrap()
            .into_inner();

        assert!(reply.provider_notified);
        assert!(!reply.confirmation_sent);
        assert!(reply.detail.contains("Dr. Jane Smith"));
    }

    #[tokio::test]
    async fn lists_facilities_from_source() {
        let mut csv = tempfile::NamedTempFile::new().unwrap();
        write!(
            csv,
            "Name,Location,Contact,Speciality,Free_Treatment\n\
             Civil Hospital,Ahmedabad,079-2268,Neurology,Yes\n\
             Apollo,Chennai,044-2829,Oncology,No\n"
        )
        .unwrap();
        let svc = service(
            vec![1.0, 0.0],
            Arc::new(RecordingTransport::default()),
            csv.path().to_path_buf(),
        );

        let reply = svc
            .list_facilities(Request::new(ListFacilitiesRequest {}))
            .await
            .unwrap()
            .into_inner();

        let names: Vec<&str> = reply.facilities.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Civil Hospital", "Apollo"]);
        assert!(reply.facilities[0].free_treatment);
        assert!(reply.rendered.contains("Apollo\n  Location: Chennai"));
    }

    #[tokio::test]
    async fn missing_facility_source_is_failed_precondition() {
        let status = default_service(vec![1.0, 0.0])
            .list_facilities(Request::new(ListFacilitiesRequest {}))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::FailedPrecondition);
    }
}
