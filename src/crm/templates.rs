//! CRM grid query bodies and page URLs
//!
//! The grid web service takes an XML document describing a saved view plus
//! a quick-find string. Only the quick-find varies per request.

/// Saved view queried through the grid endpoint
pub struct GridView {
    pub title: &'static str,
    pub view_id: &'static str,
    pub otc: u32,
    pub otn: &'static str,
    pub display_name: &'static str,
    pub plural_display_name: &'static str,
    pub sort_columns: &'static str,
    pub sitemap_path: &'static str,
    pub filter_fetch_xml: &'static str,
    pub effective_fetch_xml: &'static str,
}

/// Single page large enough for any account's records
const RECORDS_PER_PAGE: u32 = 999;

pub const ACTIVE_ACCOUNTS: GridView = GridView {
    title: "Active Accounts",
    view_id: "{2D1187C4-23FE-4BB5-9647-43BB1C6DDBD1}",
    otc: 1,
    otn: "account",
    display_name: "Account",
    plural_display_name: "Accounts",
    sort_columns: "name&#58;1",
    sitemap_path: "nav_accts",
    filter_fetch_xml: r#"&lt;fetch version="1.0" output-format="xml-platform" mapping="logical"&gt;&lt;entity name="account"&gt;&lt;attribute name="name" /&gt;&lt;attribute name="address1_city" /&gt;&lt;attribute name="telephone1" /&gt;&lt;filter type="and"&gt;&lt;condition attribute="statecode" operator="eq" value="0" /&gt;&lt;/filter&gt;&lt;attribute name="nl_accountcontactid" /&gt;&lt;link-entity alias="a_1a779ce98493df11a794001aa04053b3" name="contact" from="contactid" to="nl_accountcontactid" link-type="outer" visible="false"&gt;&lt;attribute name="emailaddress1" /&gt;&lt;/link-entity&gt;&lt;attribute name="nl_accounttype" /&gt;&lt;attribute name="address1_stateorprovince" /&gt;&lt;attribute name="accountid" /&gt;&lt;/entity&gt;&lt;/fetch&gt;"#,
    effective_fetch_xml: r#"&lt;fetch distinct="false" no-lock="false" mapping="logical" page="1" count="50" returntotalrecordcount="true"&gt;&lt;entity name="account"&gt;&lt;attribute name="name" /&gt;&lt;attribute name="address1_city" /&gt;&lt;attribute name="telephone1" /&gt;&lt;attribute name="nl_accountcontactid" /&gt;&lt;attribute name="nl_accounttype" /&gt;&lt;attribute name="address1_stateorprovince" /&gt;&lt;attribute name="accountid" /&gt;&lt;filter type="and"&gt;&lt;condition attribute="statecode" operator="eq" value="0" /&gt;&lt;/filter&gt;&lt;order attribute="name" descending="false" /&gt;&lt;link-entity name="contact" to="nl_accountcontactid" from="contactid" link-type="outer" alias="a_1a779ce98493df11a794001aa04053b3"&gt;&lt;attribute name="emailaddress1" /&gt;&lt;/link-entity&gt;&lt;/entity&gt;&lt;/fetch&gt;"#,
};

pub const ACTIVE_WIRELESS: GridView = GridView {
    title: "Active Wireless",
    view_id: "{87050EA1-B815-413E-AC64-4695DA9308A3}",
    otc: 10014,
    otn: "nl_wireless",
    display_name: "Wireless",
    plural_display_name: "Wireless",
    sort_columns: "createdon&#58;0",
    sitemap_path: "nl_wireless",
    filter_fetch_xml: r#"&lt;fetch version="1.0" output-format="xml-platform" mapping="logical" distinct="false"&gt;&lt;entity name="nl_wireless"&gt;&lt;attribute name="nl_serialnumber" /&gt;&lt;attribute name="createdon" /&gt;&lt;attribute name="nl_serviceprovidercode" /&gt;&lt;attribute name="nl_locationid" /&gt;&lt;attribute name="nl_accountid" /&gt;&lt;attribute name="nl_wirelessphonenumber" /&gt;&lt;attribute name="nl_verizonserialnumber" /&gt;&lt;attribute name="nl_routerserialnumber" /&gt;&lt;order attribute="createdon" descending="true" /&gt;&lt;filter type="and"&gt;&lt;condition attribute="statecode" operator="eq" value="0" /&gt;&lt;condition attribute="statuscode" operator="in"&gt;&lt;value&gt;1&lt;/value&gt;&lt;value&gt;100000002&lt;/value&gt;&lt;/condition&gt;&lt;/filter&gt;&lt;/entity&gt;&lt;/fetch&gt;"#,
    effective_fetch_xml: r#"&lt;fetch distinct="false" no-lock="false" mapping="logical" page="1" count="50" returntotalrecordcount="true"&gt;&lt;entity name="nl_wireless"&gt;&lt;attribute name="nl_serialnumber" /&gt;&lt;attribute name="createdon" /&gt;&lt;attribute name="nl_serviceprovidercode" /&gt;&lt;attribute name="nl_locationid" /&gt;&lt;attribute name="nl_accountid" /&gt;&lt;attribute name="nl_wirelessphonenumber" /&gt;&lt;attribute name="nl_verizonserialnumber" /&gt;&lt;attribute name="nl_routerserialnumber" /&gt;&lt;attribute name="nl_wirelessid" /&gt;&lt;filter type="and"&gt;&lt;condition attribute="statecode" operator="eq" value="0" /&gt;&lt;condition attribute="statuscode" operator="in"&gt;&lt;value&gt;1&lt;/value&gt;&lt;value&gt;100000002&lt;/value&gt;&lt;/condition&gt;&lt;/filter&gt;&lt;order attribute="createdon" descending="true" /&gt;&lt;/entity&gt;&lt;/fetch&gt;"#,
};

impl GridView {
    /// Grid request body with `quickfind` substituted
    pub fn render(&self, quickfind: &str) -> String {
        format!(
            "<grid>\
<sortColumns>{sort}</sortColumns>\
<pageNum>1</pageNum>\
<recsPerPage>{per_page}</recsPerPage>\
<dataProvider>Microsoft.Crm.Application.Platform.Grid.GridDataProviderQueryBuilder</dataProvider>\
<uiProvider>Microsoft.Crm.Application.Controls.GridUIProvider</uiProvider>\
<cols/>\
<max>-1</max>\
<refreshAsync>False</refreshAsync>\
<pagingCookie/>\
<enableMultiSort>true</enableMultiSort>\
<enablePagingWhenOnePage>true</enablePagingWhenOnePage>\
<parameters>\
<autorefresh>1</autorefresh>\
<isGridHidden>false</isGridHidden>\
<isGridFilteringEnabled>1</isGridFilteringEnabled>\
<viewid>{view_id}</viewid>\
<viewtype>1039</viewtype>\
<RecordsPerPage>{per_page}</RecordsPerPage>\
<viewTitle>{title}</viewTitle>\
<otc>{otc}</otc>\
<otn>{otn}</otn>\
<entitydisplayname>{display}</entitydisplayname>\
<titleformat>{{0}} {{1}}</titleformat>\
<entitypluraldisplayname>{plural}</entitypluraldisplayname>\
<isWorkflowSupported>true</isWorkflowSupported>\
<fetchXmlForFilters>{filter_xml}</fetchXmlForFilters>\
<isFetchXmlNotFinal>False</isFetchXmlNotFinal>\
<effectiveFetchXml>{effective_xml}</effectiveFetchXml>\
<LayoutStyle>GridList</LayoutStyle>\
<enableFilters>1</enableFilters>\
<quickfind>{quickfind}</quickfind>\
<filter/>\
<filterDisplay/>\
</parameters>\
</grid>",
            sort = self.sort_columns,
            per_page = RECORDS_PER_PAGE,
            view_id = self.view_id,
            title = self.title,
            otc = self.otc,
            otn = self.otn,
            display = self.display_name,
            plural = self.plural_display_name,
            filter_xml = self.filter_fetch_xml,
            effective_xml = self.effective_fetch_xml,
            quickfind = escape_quickfind(quickfind),
        )
    }

    /// Homepage the grid request claims to come from
    pub fn referer(&self, base_url: &str) -> String {
        format!(
            "{}/_root/homepage.aspx?etc={}&pagemode=iframe&sitemappath=CS%7cCS%7c{}",
            base_url.trim_end_matches('/'),
            self.otc,
            self.sitemap_path
        )
    }
}

/// Ampersands are the only character seen in account names that breaks
/// the grid document.
pub fn escape_quickfind(value: &str) -> String {
    value.replace('&', "&#38;")
}

pub fn grid_url(base_url: &str) -> String {
    format!(
        "{}/AppWebServices/AppGridWebService.ashx?id=crmGrid&operation=Reset",
        base_url.trim_end_matches('/')
    )
}

/// Record form for one wireless entry, opened in the wireless view
pub fn record_page_url(base_url: &str, entity_type_id: &str, object_id: &str) -> String {
    let object_id = object_id.replace(['{', '}'], "");
    let rskey = ACTIVE_WIRELESS.view_id.trim_matches(|c| c == '{' || c == '}');
    format!(
        "{base}/main.aspx?etc={etc}&extraqs=%3f_gridType%3d{etc}%26etc%3d{etc}%26id%3d%257b{oid}%257d%26rskey%3d%257b{rskey}%257d&pagemode=iframe&pagetype=entityrecord&rskey=%7b{rskey}%7d",
        base = base_url.trim_end_matches('/'),
        etc = entity_type_id,
        oid = object_id,
        rskey = rskey,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_quickfind() {
        assert_eq!(escape_quickfind("Smith & Sons"), "Smith &#38; Sons");
        assert_eq!(escape_quickfind("user@example.com"), "user@example.com");
    }

    #[test]
    fn test_render_substitutes_quickfind() {
        let body = ACTIVE_WIRELESS.render("A&B Market");
        assert!(body.contains("<quickfind>A&#38;B Market</quickfind>"));
        assert!(body.contains("<viewid>{87050EA1-B815-413E-AC64-4695DA9308A3}</viewid>"));
        assert!(body.contains("<otn>nl_wireless</otn>"));
        assert!(body.contains("<titleformat>{0} {1}</titleformat>"));
        assert!(body.contains("<recsPerPage>999</recsPerPage>"));
    }

    #[test]
    fn test_accounts_view() {
        let body = ACTIVE_ACCOUNTS.render("owner@example.com");
        assert!(body.contains("<quickfind>owner@example.com</quickfind>"));
        assert!(body.contains("<otc>1</otc>"));
        assert!(body.contains("<sortColumns>name&#58;1</sortColumns>"));
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            grid_url("http://crm.local/Org/"),
            "http://crm.local/Org/AppWebServices/AppGridWebService.ashx?id=crmGrid&operation=Reset"
        );
        assert_eq!(
            ACTIVE_WIRELESS.referer("http://crm.local/Org"),
            "http://crm.local/Org/_root/homepage.aspx?etc=10014&pagemode=iframe&sitemappath=CS%7cCS%7cnl_wireless"
        );

        let url = record_page_url("http://crm.local/Org", "10014", "{ABC-123}");
        assert!(url.starts_with("http://crm.local/Org/main.aspx?etc=10014&extraqs="));
        assert!(url.contains("%26id%3d%257bABC-123%257d"));
        assert!(url.ends_with("&rskey=%7b87050EA1-B815-413E-AC64-4695DA9308A3%7d"));
    }
}
