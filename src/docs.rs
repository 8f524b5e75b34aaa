use utoipa::OpenApi;

use crate::common::error::ErrorKind;
use crate::media::filter_graph::{GradeOptions, Interpolation};
use crate::modules::job::dto::*;
use crate::modules::job::model::{
    AppliedLut, JobError, JobProgress, JobResult, JobStage, JobStatus, MediaSummary, Transition,
};
use crate::modules::lut::dto::{DeletedLut, LutValidationErrors};
use crate::modules::lut::model::{ColorSpace, LutDescriptor, LutDimension};
use crate::modules::lut::parser::{LutDetails, LutValidation};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::job::handler::apply_lut,
        crate::modules::job::handler::get_job,
        crate::modules::lut::handler::list_luts,
        crate::modules::lut::handler::get_lut,
        crate::modules::lut::handler::create_lut,
        crate::modules::lut::handler::validate_lut,
        crate::modules::lut::handler::delete_lut,
    ),
    components(
        schemas(
            TriggerPayload, TriggerData, ResourceRef, ScopeRef,
            ActionForm, FormField, FormOption, JobAccepted,
            JobStatusResponse, JobRequestView, JobStatus, JobStage, JobProgress,
            JobResult, JobError, ErrorKind, MediaSummary, AppliedLut, Transition,
            GradeOptions, Interpolation,
            LutDescriptor, LutDimension, ColorSpace, LutValidation, LutDetails,
            LutValidationErrors, DeletedLut,
        )
    ),
    tags(
        (name = "Actions", description = "Signed custom-action webhooks"),
        (name = "Jobs", description = "Grading job status"),
        (name = "LUTs", description = "LUT catalog administration")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("Admin API token")
                        .build(),
                ),
            );
        }
    }
}
