//! Consultation report generation: form validation, persistence and branded PDF rendering.
//!
//! [`service::ReportService`] ties the pieces together: a [`form::ConsultationForm`] is
//! validated into [`record::ReportDetails`], stored through [`storage::Storage`] (logo files go
//! to [`media::MediaStore`]) and laid out by [`report::ReportRenderer`] on top of the `genpdf`
//! helpers in [`builder`] and [`elements`].

pub mod builder;
pub mod config;
pub mod elements;
pub mod error;
pub mod fonts;
pub mod form;
pub mod media;
pub mod model;
pub mod record;
pub mod report;
pub mod richtext;
pub mod service;
pub mod storage;

#[cfg(feature = "bookmarks")]
pub mod bookmarks;

pub use config::Config;
pub use error::{Error, Result};
pub use form::{ConsultationForm, Field, FormErrors, FormLimits, LogoUpload};
pub use record::{ConsultationReport, ReportDetails};
pub use report::{RenderContext, RenderedReport, ReportRenderer};
pub use service::ReportService;
