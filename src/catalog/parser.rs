//! Catalog XML parser. The vocabulary is fixed by the protocol family;
//! anything unrecognized is a configuration error so typos fail the run
//! before a single request goes out.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{
    Catalog, Request, RequestBody, RequestClassification, TestCase, TestCaseType, TestCategory,
    TestGroup,
};
use crate::error::ValidatorError;
use crate::resources::ResourceDecl;
use crate::validators::json::{JsonPropertyKind, JsonPropertyValidator};
use crate::validators::savers::StateSaver;
use crate::validators::{
    HeaderExpectation, JsonContentValidator, LockMismatchValidator, ResponseCodeValidator,
    ResponseContentValidator, ResponseHeaderValidator, Validator,
};

pub fn parse_catalog_file(path: &Path) -> Result<Catalog, ValidatorError> {
    let xml = std::fs::read_to_string(path).map_err(|e| {
        cfg_err(format!(
            "could not read catalog {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_catalog(&xml)
}

pub fn parse_catalog(xml: &str) -> Result<Catalog, ValidatorError> {
    let root = parse_tree(xml)?;
    if root.name != "WopiValidation" {
        return Err(cfg_err(format!(
            "expected <WopiValidation> root, found <{}>",
            root.name
        )));
    }

    let resources = match root.child("Resources") {
        Some(el) => el
            .children_named("File")
            .map(resource_decl)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let prereq_cases = match root.child("PrereqCases") {
        Some(el) => el
            .children_named("TestCase")
            .map(|c| test_case(c, TestCaseType::Prerequisite))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let groups = root
        .children_named("TestGroup")
        .map(test_group)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Catalog {
        resources,
        prereq_cases,
        groups,
    })
}

fn cfg_err(message: impl Into<String>) -> ValidatorError {
    ValidatorError::Configuration(message.into())
}

// ============================================================================
// Lightweight element tree
// ============================================================================

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn require_attr(&self, name: &str) -> Result<&str, ValidatorError> {
        self.attr(name)
            .ok_or_else(|| cfg_err(format!("<{}> is missing the {} attribute", self.name, name)))
    }

    fn bool_attr(&self, name: &str, default: bool) -> Result<bool, ValidatorError> {
        match self.attr(name) {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(cfg_err(format!(
                "<{}> attribute {} must be true or false, got '{}'",
                self.name, name, other
            ))),
        }
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(|c| c.text.trim().to_string())
    }
}

fn parse_tree(xml: &str) -> Result<Element, ValidatorError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Err(e) => {
                return Err(cfg_err(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => stack.push(element_from(&start)?),
            Ok(Event::Empty(start)) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| cfg_err("unbalanced closing tag in catalog"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| cfg_err(format!("bad text content: {}", e)))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    top.text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(_) => {} // declarations, comments, processing instructions
        }
    }

    root.ok_or_else(|| cfg_err("catalog document has no root element"))
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, ValidatorError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| cfg_err(format!("bad attribute in <{}>: {}", name, e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| cfg_err(format!("bad attribute value in <{}>: {}", name, e)))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ValidatorError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(cfg_err("catalog document has more than one root element"));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

// ============================================================================
// Model mapping
// ============================================================================

fn resource_decl(el: &Element) -> Result<ResourceDecl, ValidatorError> {
    Ok(ResourceDecl {
        id: el.require_attr("Id")?.to_string(),
        file_name: el.require_attr("Name")?.to_string(),
        file_path: el.require_attr("FilePath")?.to_string(),
    })
}

fn test_group(el: &Element) -> Result<TestGroup, ValidatorError> {
    let name = el.require_attr("Name")?.to_string();
    let cases = match el.child("TestCases") {
        Some(container) => container
            .children_named("TestCase")
            .map(|c| test_case(c, TestCaseType::Default))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    Ok(TestGroup { name, cases })
}

fn test_case(el: &Element, case_type: TestCaseType) -> Result<TestCase, ValidatorError> {
    let name = el.require_attr("Name")?.to_string();
    let category = match el.attr("Category").unwrap_or("WopiCore") {
        "WopiCore" => TestCategory::WopiCore,
        "OfficeNativeClient" => TestCategory::OfficeNativeClient,
        "OfficeOnline" => TestCategory::OfficeOnline,
        other => {
            return Err(cfg_err(format!(
                "test case '{}' has unknown category '{}'",
                name, other
            )))
        }
    };

    let classification = match case_type {
        TestCaseType::Default => RequestClassification::Standard,
        TestCaseType::Prerequisite => RequestClassification::Prerequisite,
    };

    let requests = match el.child("Requests") {
        Some(container) => container
            .children_named("Request")
            .map(|r| request(r, classification))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    let cleanup_requests = match el.child("CleanupRequests") {
        Some(container) => container
            .children_named("Request")
            .map(|r| request(r, RequestClassification::Cleanup))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(TestCase {
        description: el.child_text("Description").unwrap_or_default(),
        category,
        case_type,
        resource_id: el.require_attr("Document")?.to_string(),
        upload_document_on_setup: el.bool_attr("UploadDocumentOnSetup", false)?,
        delete_document_on_tear_down: el.bool_attr("DeleteDocumentOnTearDown", false)?,
        requests,
        cleanup_requests,
        fail_message: el.child_text("FailMessage"),
        documentation_link: el.child_text("DocumentationLink"),
        ui_screenshot: el.child_text("UiScreenshot"),
        name,
    })
}

fn request(
    el: &Element,
    classification: RequestClassification,
) -> Result<Request, ValidatorError> {
    let name = el.require_attr("Name")?.to_string();
    let method_str = el.require_attr("Method")?;
    let method = reqwest::Method::from_bytes(method_str.as_bytes())
        .map_err(|_| cfg_err(format!("request '{}' has bad method '{}'", name, method_str)))?;

    let expected_code = el
        .attr("ExpectedCode")
        .map(|s| {
            s.parse::<u16>().map_err(|_| {
                cfg_err(format!(
                    "request '{}' has non-numeric ExpectedCode '{}'",
                    name, s
                ))
            })
        })
        .transpose()?;

    let header_templates = match el.child("Headers") {
        Some(container) => container
            .children_named("Header")
            .map(|h| {
                Ok((
                    h.require_attr("Name")?.to_string(),
                    h.require_attr("Value")?.to_string(),
                ))
            })
            .collect::<Result<Vec<_>, ValidatorError>>()?,
        None => Vec::new(),
    };

    let body_template = el.child("Body").map(|body| match body.attr("ResourceId") {
        Some(id) => RequestBody::Resource(id.to_string()),
        None => RequestBody::Text(body.text.trim().to_string()),
    });

    let validators = match el.child("Validators") {
        Some(container) => container
            .children
            .iter()
            .map(validator)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let state_savers = match el.child("StateSavers") {
        Some(container) => container
            .children
            .iter()
            .map(state_saver)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Request {
        classification,
        method,
        url_template: el.require_attr("Url")?.to_string(),
        header_templates,
        body_template,
        expected_code,
        expected_status_text: el.attr("ExpectedStatusText").map(str::to_string),
        requires_proof_key: el.bool_attr("RequiresProofKey", false)?,
        validators,
        state_savers,
        followup_prerequisite: el.attr("FollowupPrerequisite").map(str::to_string),
        always_run_cleanup: el.bool_attr("AlwaysRunCleanup", false)?,
        name,
    })
}

fn validator(el: &Element) -> Result<Validator, ValidatorError> {
    match el.name.as_str() {
        "ResponseCodeValidator" => {
            let code = el.require_attr("ExpectedCode")?;
            let expected = code.parse::<u16>().map_err(|_| {
                cfg_err(format!("ResponseCodeValidator: bad ExpectedCode '{}'", code))
            })?;
            Ok(Validator::ResponseCode(ResponseCodeValidator { expected }))
        }
        "ResponseContentValidator" => {
            let v = ResponseContentValidator {
                expected_resource_id: el.attr("ExpectedResourceId").map(str::to_string),
                expected_state_key: el.attr("ExpectedStateKey").map(str::to_string),
            };
            if v.expected_resource_id.is_none() && v.expected_state_key.is_none() {
                return Err(cfg_err(
                    "ResponseContentValidator needs ExpectedResourceId or ExpectedStateKey",
                ));
            }
            Ok(Validator::ResponseContent(v))
        }
        "ResponseHeaderValidator" => {
            let header = el.require_attr("Header")?.to_string();
            let expectation = if el.bool_attr("ShouldBeAbsent", false)? {
                HeaderExpectation::Absent
            } else if el.bool_attr("IsUrl", false)? {
                HeaderExpectation::AbsoluteUrl {
                    must_include_access_token: el.bool_attr("MustIncludeAccessToken", false)?,
                }
            } else if let Some(key) = el.attr("ExpectedStateKey") {
                HeaderExpectation::EqualsState(key.to_string())
            } else if let Some(value) = el.attr("ExpectedValue") {
                HeaderExpectation::EqualsLiteral(value.to_string())
            } else {
                HeaderExpectation::Present
            };
            Ok(Validator::ResponseHeader(ResponseHeaderValidator {
                header,
                expectation,
            }))
        }
        "LockMismatchValidator" => Ok(Validator::LockMismatch(LockMismatchValidator {
            expected_value: el.attr("ExpectedValue").map(str::to_string),
            expected_state_key: el.attr("ExpectedStateKey").map(str::to_string),
            is_required: el.bool_attr("IsRequired", true)?,
        })),
        "JsonResponseContentValidator" => {
            let properties = el
                .children
                .iter()
                .map(json_property)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Validator::JsonContent(JsonContentValidator { properties }))
        }
        other => Err(cfg_err(format!("unknown validator element <{}>", other))),
    }
}

fn json_property(el: &Element) -> Result<JsonPropertyValidator, ValidatorError> {
    let kind = match el.name.as_str() {
        "IntegerProperty" => JsonPropertyKind::Integer,
        "BooleanProperty" => JsonPropertyKind::Boolean,
        "StringProperty" => JsonPropertyKind::String,
        "StringEndsWithProperty" => JsonPropertyKind::StringEndsWith,
        "StringRegexProperty" => JsonPropertyKind::StringRegex {
            should_match: el.bool_attr("ShouldMatch", true)?,
        },
        "AbsoluteUrlProperty" => JsonPropertyKind::AbsoluteUrl {
            must_include_access_token: el.bool_attr("MustIncludeAccessToken", false)?,
        },
        "ArrayContainsProperty" => JsonPropertyKind::ArrayContains,
        other => return Err(cfg_err(format!("unknown property element <{}>", other))),
    };

    let expected_value = el
        .attr("ExpectedValue")
        .or_else(|| el.attr("ContainsValue"))
        .map(str::to_string);

    Ok(JsonPropertyValidator {
        key: el.require_attr("Name")?.to_string(),
        kind,
        is_required: el.bool_attr("IsRequired", false)?,
        expected_value,
        expected_state_key: el.attr("ExpectedStateKey").map(str::to_string),
    })
}

fn state_saver(el: &Element) -> Result<StateSaver, ValidatorError> {
    match el.name.as_str() {
        "SaveResponseHeader" => Ok(StateSaver::ResponseHeader {
            header: el.require_attr("Header")?.to_string(),
            save_as: el.require_attr("As")?.to_string(),
        }),
        "SaveJsonProperty" => Ok(StateSaver::JsonProperty {
            path: el.require_attr("Path")?.to_string(),
            save_as: el.require_attr("As")?.to_string(),
        }),
        "SaveResponseBody" => Ok(StateSaver::ResponseBody {
            save_as: el.require_attr("As")?.to_string(),
        }),
        "SaveState" => Ok(StateSaver::Literal {
            key: el.require_attr("Key")?.to_string(),
            value: el.require_attr("Value")?.to_string(),
        }),
        other => Err(cfg_err(format!("unknown state saver element <{}>", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_CATALOG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<WopiValidation>
  <Resources>
    <File Id="Doc" Name="doc.wopitest" FilePath="resources/doc.wopitest"/>
  </Resources>
  <PrereqCases>
    <TestCase Name="Prereq.Lock" Document="Doc">
      <Requests>
        <Request Name="Lock" Method="POST" Url="{WopiEndpoint}" ExpectedCode="200">
          <Headers>
            <Header Name="X-WOPI-Override" Value="LOCK"/>
            <Header Name="X-WOPI-Lock" Value="prereq-lock"/>
          </Headers>
        </Request>
      </Requests>
    </TestCase>
  </PrereqCases>
  <TestGroup Name="Locks">
    <TestCases>
      <TestCase Name="Locks.Basic" Document="Doc" Category="WopiCore"
                UploadDocumentOnSetup="true" DeleteDocumentOnTearDown="true">
        <Description>Lock then read back the lock.</Description>
        <Requests>
          <Request Name="Lock" Method="POST" Url="{WopiEndpoint}" ExpectedCode="200" RequiresProofKey="true">
            <Headers>
              <Header Name="X-WOPI-Override" Value="LOCK"/>
              <Header Name="X-WOPI-Lock" Value="L1"/>
            </Headers>
            <Validators>
              <ResponseHeaderValidator Header="X-WOPI-ItemVersion"/>
              <JsonResponseContentValidator>
                <StringProperty Name="BaseFileName" ExpectedStateKey="File" IsRequired="true"/>
                <IntegerProperty Name="Size" ExpectedValue="12"/>
              </JsonResponseContentValidator>
            </Validators>
            <StateSavers>
              <SaveResponseHeader Header="X-WOPI-Lock" As="OrigLock"/>
            </StateSavers>
          </Request>
        </Requests>
        <CleanupRequests>
          <Request Name="Unlock" Method="POST" Url="{WopiEndpoint}">
            <Headers>
              <Header Name="X-WOPI-Override" Value="UNLOCK"/>
              <Header Name="X-WOPI-Lock" Value="{OrigLock}"/>
            </Headers>
          </Request>
        </CleanupRequests>
      </TestCase>
    </TestCases>
  </TestGroup>
</WopiValidation>"#;

    #[test]
    fn parses_resources_prereqs_and_groups() {
        let catalog = parse_catalog(SMALL_CATALOG).unwrap();
        assert_eq!(catalog.resources.len(), 1);
        assert_eq!(catalog.resources[0].id, "Doc");
        assert_eq!(catalog.prereq_cases.len(), 1);
        assert_eq!(catalog.groups.len(), 1);
        assert_eq!(catalog.groups[0].name, "Locks");
        catalog.validate().unwrap();
    }

    #[test]
    fn parses_case_attributes_and_children() {
        let catalog = parse_catalog(SMALL_CATALOG).unwrap();
        let case = &catalog.groups[0].cases[0];
        assert_eq!(case.name, "Locks.Basic");
        assert!(case.upload_document_on_setup);
        assert!(case.delete_document_on_tear_down);
        assert_eq!(case.description, "Lock then read back the lock.");
        assert_eq!(case.requests.len(), 1);
        assert_eq!(case.cleanup_requests.len(), 1);

        let request = &case.requests[0];
        assert_eq!(request.method, reqwest::Method::POST);
        assert_eq!(request.expected_code, Some(200));
        assert!(request.requires_proof_key);
        assert_eq!(request.header_templates.len(), 2);
        assert_eq!(request.validators.len(), 2);
        assert_eq!(request.state_savers.len(), 1);
        assert_eq!(
            request.classification,
            RequestClassification::Standard
        );
        assert_eq!(
            case.cleanup_requests[0].classification,
            RequestClassification::Cleanup
        );
    }

    #[test]
    fn prereq_requests_are_classified_prerequisite() {
        let catalog = parse_catalog(SMALL_CATALOG).unwrap();
        assert_eq!(
            catalog.prereq_cases[0].requests[0].classification,
            RequestClassification::Prerequisite
        );
    }

    #[test]
    fn unknown_validator_element_is_a_configuration_error() {
        let xml = SMALL_CATALOG.replace("ResponseHeaderValidator", "MadeUpValidator");
        let err = parse_catalog(&xml).unwrap_err();
        assert!(matches!(err, ValidatorError::Configuration(_)));
    }

    #[test]
    fn unknown_prerequisite_reference_fails_validation() {
        let xml = SMALL_CATALOG.replace(
            r#"Name="Lock" Method="POST" Url="{WopiEndpoint}" ExpectedCode="200" RequiresProofKey="true""#,
            r#"Name="Lock" Method="POST" Url="{WopiEndpoint}" ExpectedCode="200" FollowupPrerequisite="Nope""#,
        );
        let catalog = parse_catalog(&xml).unwrap();
        assert!(matches!(
            catalog.validate().unwrap_err(),
            ValidatorError::Configuration(_)
        ));
    }

    #[test]
    fn malformed_xml_is_a_configuration_error() {
        let err = parse_catalog("<WopiValidation><Unclosed>").unwrap_err();
        assert!(matches!(err, ValidatorError::Configuration(_)));
    }
}
