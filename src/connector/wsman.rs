//! WS-Management SOAP messages for the WinRM remote shell resource.
//!
//! Only the five operations a command round trip needs are modelled:
//! Create (shell), Command, Receive, Signal and Delete (shell).

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

pub(crate) const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
pub(crate) const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
pub(crate) const ACTION_COMMAND: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
pub(crate) const ACTION_RECEIVE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
pub(crate) const ACTION_SIGNAL: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal";

const RESOURCE_URI_CMD: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";
const SIGNAL_TERMINATE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";
const STATE_DONE_SUFFIX: &str = "CommandState/Done";
const ANONYMOUS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";
const MAX_ENVELOPE_SIZE: u32 = 153_600;

/// WSManFault code for an expired OperationTimeout; Receive just polls again.
pub(crate) const OPERATION_TIMEOUT_CODE: &str = "2150858793";

pub(crate) const SHELL_OPTIONS: &[(&str, &str)] =
    &[("WINRS_NOPROFILE", "FALSE"), ("WINRS_CODEPAGE", "65001")];
pub(crate) const COMMAND_OPTIONS: &[(&str, &str)] = &[
    ("WINRS_CONSOLEMODE_STDIN", "TRUE"),
    ("WINRS_SKIP_CMD_SHELL", "FALSE"),
];

/// Build a complete SOAP envelope for one WS-Man request.
pub(crate) fn envelope(
    endpoint: &str,
    action: &str,
    shell_id: Option<&str>,
    options: &[(&str, &str)],
    body: &str,
    timeout_secs: u64,
) -> String {
    let mut header = String::new();
    header.push_str(&format!("<wsa:To>{}</wsa:To>", escape(endpoint)));
    header.push_str(&format!(
        "<wsa:ReplyTo><wsa:Address s:mustUnderstand=\"true\">{ANONYMOUS}</wsa:Address></wsa:ReplyTo>"
    ));
    header.push_str(&format!(
        "<wsman:ResourceURI s:mustUnderstand=\"true\">{RESOURCE_URI_CMD}</wsman:ResourceURI>"
    ));
    header.push_str(&format!(
        "<wsa:Action s:mustUnderstand=\"true\">{action}</wsa:Action>"
    ));
    header.push_str(&format!(
        "<wsa:MessageID>uuid:{}</wsa:MessageID>",
        uuid::Uuid::new_v4().to_string().to_uppercase()
    ));
    header.push_str(&format!(
        "<wsman:MaxEnvelopeSize s:mustUnderstand=\"true\">{MAX_ENVELOPE_SIZE}</wsman:MaxEnvelopeSize>"
    ));
    header.push_str("<wsman:Locale xml:lang=\"en-US\" s:mustUnderstand=\"false\"/>");
    header.push_str(&format!(
        "<wsman:OperationTimeout>PT{timeout_secs}S</wsman:OperationTimeout>"
    ));
    if let Some(id) = shell_id {
        header.push_str(&format!(
            "<wsman:SelectorSet><wsman:Selector Name=\"ShellId\">{}</wsman:Selector></wsman:SelectorSet>",
            escape(id)
        ));
    }
    if !options.is_empty() {
        header.push_str("<wsman:OptionSet>");
        for (name, value) in options {
            header.push_str(&format!(
                "<wsman:Option Name=\"{name}\">{value}</wsman:Option>"
            ));
        }
        header.push_str("</wsman:OptionSet>");
    }

    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
            "<s:Envelope xmlns:s=\"http://www.w3.org/2003/05/soap-envelope\" ",
            "xmlns:wsa=\"http://schemas.xmlsoap.org/ws/2004/08/addressing\" ",
            "xmlns:wsman=\"http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd\" ",
            "xmlns:rsp=\"http://schemas.microsoft.com/wbem/wsman/1/windows/shell\">",
            "<s:Header>{}</s:Header><s:Body>{}</s:Body></s:Envelope>"
        ),
        header, body
    )
}

pub(crate) fn create_shell_body() -> &'static str {
    "<rsp:Shell><rsp:InputStreams>stdin</rsp:InputStreams>\
     <rsp:OutputStreams>stdout stderr</rsp:OutputStreams></rsp:Shell>"
}

/// Command body running `script` through `powershell -EncodedCommand`.
pub(crate) fn powershell_body(script: &str) -> String {
    format!(
        "<rsp:CommandLine><rsp:Command>powershell.exe</rsp:Command>\
         <rsp:Arguments>-NoProfile -NonInteractive -EncodedCommand {}</rsp:Arguments>\
         </rsp:CommandLine>",
        encode_powershell(script)
    )
}

pub(crate) fn receive_body(command_id: &str) -> String {
    format!(
        "<rsp:Receive><rsp:DesiredStream CommandId=\"{}\">stdout stderr</rsp:DesiredStream></rsp:Receive>",
        escape(command_id)
    )
}

pub(crate) fn signal_body(command_id: &str) -> String {
    format!(
        "<rsp:Signal CommandId=\"{}\"><rsp:Code>{SIGNAL_TERMINATE}</rsp:Code></rsp:Signal>",
        escape(command_id)
    )
}

/// `-EncodedCommand` takes base64 of the UTF-16LE script text.
pub(crate) fn encode_powershell(script: &str) -> String {
    let utf16: Vec<u8> = script
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    STANDARD.encode(utf16)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fault {
    pub code: Option<String>,
    pub reason: String,
}

impl Fault {
    pub fn is_operation_timeout(&self) -> bool {
        self.code.as_deref() == Some(OPERATION_TIMEOUT_CODE)
    }
}

/// The fields of a WS-Man response the shell round trip cares about.
#[derive(Debug, Default)]
pub(crate) struct Response {
    pub shell_id: Option<String>,
    pub command_id: Option<String>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub done: bool,
    pub exit_code: Option<i32>,
    pub fault: Option<Fault>,
}

struct Frame {
    name: String,
    /// `Name` attribute (Stream, Selector) or `Code` attribute (WSManFault).
    tag: Option<String>,
}

fn local(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Parse a WS-Man response (success or SOAP fault).
pub(crate) fn parse(xml: &str) -> Result<Response, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut resp = Response::default();
    let mut stack: Vec<Frame> = Vec::new();
    let mut fault_text = String::new();
    let mut fault_message = String::new();
    let mut fault_code: Option<String> = None;
    let mut in_fault = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local(e.local_name().as_ref());
                handle_open(&e, &name, &mut resp, &mut fault_code, &mut in_fault);
                let tag = match name.as_str() {
                    "Stream" | "Selector" => attr(&e, b"Name"),
                    _ => None,
                };
                stack.push(Frame { name, tag });
            }
            Ok(Event::Empty(e)) => {
                let name = local(e.local_name().as_ref());
                handle_open(&e, &name, &mut resp, &mut fault_code, &mut in_fault);
            }
            Ok(Event::Text(t)) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                let Some(frame) = stack.last() else { continue };
                match (frame.name.as_str(), frame.tag.as_deref()) {
                    ("ShellId", _) | ("Selector", Some("ShellId")) => {
                        resp.shell_id = Some(text.trim().to_string());
                    }
                    ("CommandId", _) => resp.command_id = Some(text.trim().to_string()),
                    ("Stream", stream) => {
                        let bytes = STANDARD
                            .decode(text.trim())
                            .map_err(|e| format!("invalid base64 in stream: {e}"))?;
                        match stream {
                            Some("stderr") => resp.stderr.extend(bytes),
                            _ => resp.stdout.extend(bytes),
                        }
                    }
                    ("ExitCode", _) => resp.exit_code = text.trim().parse().ok(),
                    ("Text", _) if in_fault => fault_text.push_str(&text),
                    ("Message", _) if in_fault => fault_message.push_str(&text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed WS-Man response at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
    }

    if in_fault {
        let reason = if !fault_message.trim().is_empty() {
            fault_message.trim().to_string()
        } else if !fault_text.trim().is_empty() {
            fault_text.trim().to_string()
        } else {
            "unspecified SOAP fault".to_string()
        };
        resp.fault = Some(Fault {
            code: fault_code,
            reason,
        });
    }

    Ok(resp)
}

fn handle_open(
    e: &BytesStart<'_>,
    name: &str,
    resp: &mut Response,
    fault_code: &mut Option<String>,
    in_fault: &mut bool,
) {
    match name {
        "Fault" => *in_fault = true,
        "WSManFault" => *fault_code = attr(e, b"Code"),
        "CommandState" => {
            if attr(e, b"State").is_some_and(|s| s.ends_with(STATE_DONE_SUFFIX)) {
                resp.done = true;
            }
        }
        _ => {}
    }
}

/// Extract the human-readable error records from a PowerShell CLIXML stderr
/// stream (`#< CLIXML` followed by serialized objects). Plain text passes
/// through unchanged.
pub(crate) fn clean_stderr(stderr: &str) -> String {
    let Some(xml) = stderr.trim_start().strip_prefix("#< CLIXML") else {
        return stderr.trim().to_string();
    };

    let mut reader = Reader::from_str(xml);
    let mut lines: Vec<String> = Vec::new();
    let mut in_error = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"S" => {
                in_error = attr(&e, b"S").as_deref() == Some("Error");
            }
            Ok(Event::Text(t)) if in_error => {
                let text = String::from_utf8_lossy(&t)
                    .replace("_x000D_", "")
                    .replace("_x000A_", "\n");
                lines.push(text);
            }
            Ok(Event::End(_)) => in_error = false,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    let joined = lines.concat();
    if joined.trim().is_empty() {
        stderr.trim().to_string()
    } else {
        joined.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_action_selector_and_options() {
        let xml = envelope(
            "http://win01:5985/wsman",
            ACTION_COMMAND,
            Some("ABC-123"),
            COMMAND_OPTIONS,
            "<rsp:CommandLine/>",
            20,
        );
        assert!(xml.contains(&format!("<wsa:Action s:mustUnderstand=\"true\">{ACTION_COMMAND}</wsa:Action>")));
        assert!(xml.contains("<wsman:Selector Name=\"ShellId\">ABC-123</wsman:Selector>"));
        assert!(xml.contains("<wsman:Option Name=\"WINRS_SKIP_CMD_SHELL\">FALSE</wsman:Option>"));
        assert!(xml.contains("<wsman:OperationTimeout>PT20S</wsman:OperationTimeout>"));
        assert!(xml.contains("<s:Body><rsp:CommandLine/></s:Body>"));
    }

    #[test]
    fn encodes_powershell_as_utf16le_base64() {
        // "hostname" in UTF-16LE, base64
        assert_eq!(encode_powershell("hostname"), "aABvAHMAdABuAGEAbQBlAA==");
        assert!(powershell_body("hostname").contains("-EncodedCommand aABvAHMAdABuAGEAbQBlAA=="));
    }

    #[test]
    fn parses_shell_creation() {
        let xml = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell">
            <s:Body><rsp:Shell><rsp:ShellId>11111111-2222-3333-4444-555555555555</rsp:ShellId></rsp:Shell></s:Body></s:Envelope>"#;
        let resp = parse(xml).unwrap();
        assert_eq!(
            resp.shell_id.as_deref(),
            Some("11111111-2222-3333-4444-555555555555")
        );
        assert!(resp.fault.is_none());
    }

    #[test]
    fn parses_receive_streams_and_exit_code() {
        // "web01\r\n" and "oops"
        let xml = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell">
            <s:Body><rsp:ReceiveResponse>
              <rsp:Stream Name="stdout" CommandId="C1">d2ViMDENCg==</rsp:Stream>
              <rsp:Stream Name="stderr" CommandId="C1">b29wcw==</rsp:Stream>
              <rsp:Stream Name="stdout" CommandId="C1" End="true"/>
              <rsp:CommandState CommandId="C1" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done">
                <rsp:ExitCode>0</rsp:ExitCode>
              </rsp:CommandState>
            </rsp:ReceiveResponse></s:Body></s:Envelope>"#;
        let resp = parse(xml).unwrap();
        assert_eq!(resp.stdout, b"web01\r\n");
        assert_eq!(resp.stderr, b"oops");
        assert!(resp.done);
        assert_eq!(resp.exit_code, Some(0));
    }

    #[test]
    fn running_command_state_is_not_done() {
        let xml = r#"<s:Envelope xmlns:s="x" xmlns:rsp="y"><s:Body><rsp:ReceiveResponse>
            <rsp:CommandState CommandId="C1" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Running"/>
            </rsp:ReceiveResponse></s:Body></s:Envelope>"#;
        let resp = parse(xml).unwrap();
        assert!(!resp.done);
    }

    #[test]
    fn parses_operation_timeout_fault() {
        let xml = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:f="http://schemas.microsoft.com/wbem/wsman/1/wsmanfault">
            <s:Body><s:Fault>
              <s:Code><s:Value>s:Receiver</s:Value></s:Code>
              <s:Reason><s:Text xml:lang="en-US">The WS-Management service cannot complete the operation within the time specified in OperationTimeout.</s:Text></s:Reason>
              <s:Detail><f:WSManFault Code="2150858793" Machine="win01"><f:Message>timed out</f:Message></f:WSManFault></s:Detail>
            </s:Fault></s:Body></s:Envelope>"#;
        let fault = parse(xml).unwrap().fault.unwrap();
        assert!(fault.is_operation_timeout());
        assert_eq!(fault.reason, "timed out");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("<a><b></a>").is_err());
    }

    #[test]
    fn cleans_clixml_stderr() {
        let raw = "#< CLIXML\r\n<Objs Version=\"1.1.0.1\" xmlns=\"http://schemas.microsoft.com/powershell/2004/04\"><S S=\"Error\">Get-Service : Cannot find any service_x000D__x000A_</S><S S=\"Error\">with name 'nope'.</S></Objs>";
        assert_eq!(
            clean_stderr(raw),
            "Get-Service : Cannot find any service\nwith name 'nope'."
        );
        assert_eq!(clean_stderr("  plain error \n"), "plain error");
    }
}
