use std::path::Path;

use crate::config::ConfigError;

const TEMPLATE: &str = r#"Your task is to apply mutation testing to the following code:
```
{{{code}}}
```
by replacing the PLACEHOLDER expression with a different expression that is syntactically valid
in this context and that changes the behavior of the code. The original code fragment was:
```
{{{orig}}}
```
Provide three answers as fenced code blocks containing a single line of code, using the following
template:

Option 1: The PLACEHOLDER should be replaced with:
```
<code fragment>
```
This would result in different behavior because <brief explanation>.

Option 2: The PLACEHOLDER should be replaced with:
```
<code fragment>
```
This would result in different behavior because <brief explanation>.

Option 3: The PLACEHOLDER should be replaced with:
```
<code fragment>
```
This would result in different behavior because <brief explanation>.
"#;

const TEMPLATE_FULL: &str = r#"Your task is to apply mutation testing to the following code:
```
{{{code}}}
```
The PLACEHOLDER stands for the {{feature}} `{{{orig}}}`. Replace it with a different expression
that is syntactically valid here and changes the behavior of the code. Good mutations include:
- replacing operands or operators in conditions
- calling a different function or method on the same receiver
- dropping, adding, reordering or changing arguments of calls
- swapping the receiver of a method call

Do not reproduce the original fragment. Provide three answers, each as a fenced code block that
contains only the replacement:

Option 1: The PLACEHOLDER should be replaced with:
```
<code fragment>
```

Option 2: The PLACEHOLDER should be replaced with:
```
<code fragment>
```

Option 3: The PLACEHOLDER should be replaced with:
```
<code fragment>
```
"#;

const SYSTEM_PROMPT_EXPERT: &str = "You are an expert in mutation testing. Your job is to make \
small changes to a project's code in order to find weaknesses in its test suite. If none of \
the tests fail after you make a change, that indicates that the tests may not be as effective \
as they could be.";

/// Built-in templates by identifier.
pub fn builtin(name: &str) -> Option<&'static str> {
    match name {
        "template.hb" => Some(TEMPLATE),
        "template-full.hb" => Some(TEMPLATE_FULL),
        "SystemPrompt-MutationTestingExpert.txt" => Some(SYSTEM_PROMPT_EXPERT),
        _ => None,
    }
}

/// Resolve an identifier to a built-in template, else read it as a file.
pub fn resolve(name: &str) -> Result<String, ConfigError> {
    if let Some(text) = builtin(name) {
        return Ok(text.to_string());
    }
    let builtin_name = Path::new(name).file_name().and_then(|n| n.to_str());
    let from_file = std::fs::read_to_string(name);
    match (from_file, builtin_name.and_then(builtin)) {
        (Ok(text), _) => Ok(text),
        // `templates/template.hb` style identifiers fall back to the bundled copy
        (Err(_), Some(text)) => Ok(text.to_string()),
        (Err(e), None) => Err(ConfigError::Unreadable {
            what: "template",
            path: name.to_string(),
            reason: e.to_string(),
        }),
    }
}
