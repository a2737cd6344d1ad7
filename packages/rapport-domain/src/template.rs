/// Replaces `{name}` placeholders in a single left-to-right pass. Substituted values are never
/// rescanned, and unknown placeholders are left as written.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
	let mut out = String::with_capacity(template.len());
	let mut rest = template;

	while let Some(open) = rest.find('{') {
		out.push_str(&rest[..open]);

		let after = &rest[open + 1..];
		let Some(close) = after.find('}') else {
			out.push_str(&rest[open..]);

			return out;
		};
		let name = &after[..close];

		match values.iter().find(|(key, _)| *key == name) {
			Some((_, value)) => out.push_str(value),
			None => {
				out.push('{');
				out.push_str(name);
				out.push('}');
			},
		}

		rest = &after[close + 1..];
	}

	out.push_str(rest);

	out
}
