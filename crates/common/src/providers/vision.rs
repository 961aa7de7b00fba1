//! Diagram analysis with Gemini vision
//!
//! Images are fetched, inlined as base64 and sent with a domain-specific
//! extraction prompt. The reply is line-oriented (`VARIABLES: R=10Ω, V=5V`)
//! and parsed into a [`VisionAnalysis`].

use super::llm::{call_gemini, GeminiContent, GeminiPart, GeminiRequest, GenerationConfig, InlineData};
use super::{build_http_client, ImageAnalyzer};
use crate::errors::{AppError, Result};
use crate::models::{ExtractDomain, VisionAnalysis};
use async_trait::async_trait;
use base64::Engine;
use futures::future::join_all;
use std::time::Duration;

const DEFAULT_MIME: &str = "image/jpeg";

pub struct GeminiVision {
    base_url: String,
    api_key: String,
    model: String,
    /// Image downloads get their own, shorter timeout
    fetch_client: reqwest::Client,
    client: reqwest::Client,
}

impl GeminiVision {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        fetch_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            base_url,
            api_key,
            model,
            fetch_client: build_http_client(fetch_timeout)?,
            client: build_http_client(request_timeout)?,
        })
    }

    /// Analyze several images concurrently; results keep input order
    pub async fn analyze_batch(
        &self,
        image_urls: &[String],
        context: Option<&str>,
        domain: ExtractDomain,
    ) -> Vec<Result<VisionAnalysis>> {
        join_all(image_urls.iter().map(|url| self.analyze(url, context, domain))).await
    }

    async fn fetch_image(&self, url: &str) -> Result<InlineData> {
        let response = self.fetch_client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::provider("gemini-vision", format!("could not fetch image: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::provider(
                "gemini-vision",
                format!("could not fetch image: HTTP {}", response.status()),
            ));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(DEFAULT_MIME).trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_MIME.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::provider("gemini-vision", format!("could not read image: {}", e)))?;

        Ok(InlineData {
            mime_type,
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        })
    }
}

fn extraction_prompt(context: Option<&str>, domain: ExtractDomain) -> String {
    let mut prompt = String::from("Analyze this image carefully and extract relevant information.\n\n");
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("Context: {}\n\n", context));
    }

    let body = match domain {
        ExtractDomain::Physics => "This appears to be a physics-related diagram.

Please identify and extract:
1. Variables: any labeled values (e.g., R=10Ω, V=5V, m=2kg, F=10N)
2. Equations: any visible formulas or relationships
3. Components: physical elements shown (resistors, capacitors, masses, springs)
4. System type: series circuit, parallel circuit, free body diagram, wave diagram

Format your response as:
VARIABLES: var1=value1, var2=value2, ...
EQUATIONS: eq1, eq2, ...
COMPONENTS: component1, component2, ...
DESCRIPTION: Brief description of the diagram",
        ExtractDomain::Chemistry => "This appears to be a chemistry-related diagram.

Please identify and extract:
1. Molecules: molecular formulas (e.g., H2O, CH4, NaCl)
2. Bonds: types of bonds shown
3. Reactions: any chemical equations
4. Structure type: Lewis structure, molecular geometry, reaction mechanism

Format your response as:
MOLECULES: mol1, mol2, ...
BONDS: bond_type1, bond_type2, ...
REACTIONS: reaction1, reaction2, ...
DESCRIPTION: Brief description of the diagram",
        ExtractDomain::Math => "This appears to be a mathematical diagram.

Please identify and extract:
1. Variables: labeled points, lengths, angles (e.g., x=5, θ=30°)
2. Equations: any visible equations or expressions
3. Shapes: geometric shapes present
4. Relationships: mathematical relationships shown

Format your response as:
VARIABLES: var1=value1, var2=value2, ...
EQUATIONS: eq1, eq2, ...
SHAPES: shape1, shape2, ...
DESCRIPTION: Brief description of the diagram",
    };

    prompt.push_str(body);
    prompt
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse the line-oriented model reply. Unknown lines are ignored; the raw
/// text is always kept.
pub fn parse_vision_response(text: &str, domain: ExtractDomain) -> VisionAnalysis {
    let mut analysis = VisionAnalysis {
        domain,
        raw_analysis: text.to_string(),
        ..VisionAnalysis::default()
    };

    for line in text.lines().map(str::trim) {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match label.trim() {
            "VARIABLES" => {
                for pair in value.split(',') {
                    if let Some((name, val)) = pair.split_once('=') {
                        let name = name.trim();
                        if !name.is_empty() {
                            analysis.extracted_variables.insert(name.to_string(), val.trim().to_string());
                        }
                    }
                }
            }
            "EQUATIONS" | "REACTIONS" => analysis.equations.extend(split_list(value)),
            "COMPONENTS" | "MOLECULES" | "SHAPES" => analysis.components = split_list(value),
            "DESCRIPTION" => analysis.description = value.to_string(),
            _ => {}
        }
    }

    analysis
}

#[async_trait]
impl ImageAnalyzer for GeminiVision {
    async fn analyze(
        &self,
        image_url: &str,
        context: Option<&str>,
        domain: ExtractDomain,
    ) -> Result<VisionAnalysis> {
        let image = self.fetch_image(image_url).await?;
        let prompt = extraction_prompt(context, domain);

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text { text: &prompt },
                    GeminiPart::Inline { inline_data: image },
                ],
            }],
            generation_config: Some(GenerationConfig { temperature: 0.2 }),
        };

        let text = call_gemini(&self.client, &self.base_url, &self.model, &self.api_key, &request).await?;
        let analysis = parse_vision_response(&text, domain);

        tracing::debug!(
            image_url,
            %domain,
            variables = analysis.extracted_variables.len(),
            equations = analysis.equations.len(),
            "Image analyzed"
        );
        Ok(analysis)
    }
}
