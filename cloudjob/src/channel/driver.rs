//! The script uploaded next to the payload and run on the instance.

use super::protocol::{ERROR_FILE, PAYLOAD_FILE, RESULT_FILE};

const TEMPLATE: &str = r#"import json
import sys
import traceback


def main():
    try:
        with open("@PAYLOAD@") as fh:
            payload = json.load(fh)
        callable_ = payload["callable"]
        namespace = {"__name__": "__cloudjob__"}
        exec(compile(callable_["source"], "<payload>", "exec"), namespace)
        func = namespace[callable_["entrypoint"]]
        result = func(*payload.get("args", []), **payload.get("kwargs", {}))
        encoded = json.dumps(result, allow_nan=False)
        with open("@RESULT@", "w") as fh:
            fh.write(encoded)
    except Exception as exc:
        message = "{}: {}".format(type(exc).__name__, exc)
        with open("@ERROR@", "w") as fh:
            json.dump({"message": message, "traceback": traceback.format_exc()}, fh)
        sys.stderr.write(message + "\n")
        sys.exit(1)


if __name__ == "__main__":
    main()
"#;

/// Render the driver for the current file layout.
pub fn render() -> String {
    TEMPLATE
        .replace("@PAYLOAD@", PAYLOAD_FILE)
        .replace("@RESULT@", RESULT_FILE)
        .replace("@ERROR@", ERROR_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_references_protocol_files() {
        let script = render();
        assert!(!script.contains('@'));
        for file in [PAYLOAD_FILE, RESULT_FILE, ERROR_FILE] {
            assert!(script.contains(&format!("\"{}\"", file)), "missing {}", file);
        }
        assert!(script.contains("sys.exit(1)"));
        assert!(script.contains("sys.stderr.write"));
        // NaN and Infinity are not JSON, they must fail inside the try block
        assert!(script.contains("json.dumps(result, allow_nan=False)"));
    }
}
